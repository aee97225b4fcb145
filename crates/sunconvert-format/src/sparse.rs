//! Position-indexed documents for the record-oriented formats.
//!
//! KBDX, IBImport, RunAway, QingXu and McFunction all describe blocks one
//! position at a time. They share [`SparseBuilder`], which deduplicates by
//! position (last write wins) and infers bounds from the observed extrema,
//! and the resulting [`SparseStructure`].

use rustc_hash::FxHashMap;
use sunconvert_nbt::NbtCompound;
use sunconvert_voxel::{BlockPos, BlockRegistry, BoundingBox, RuntimeId, SUB_CHUNK_SIZE, Size};
use tracing::debug;

use crate::Format;
use crate::error::StructureError;
use crate::selection::Selection;
use crate::structure::{BlockRecord, LayerSink, Metadata, SharedRegistry, Structure};

/// Size of the inclusive box `min..=max`.
///
/// Coordinates are arbitrary `i32` values from the file, so the span is taken
/// in `i64` and must fit a positive `i32` on every axis.
pub(crate) fn extent(format: &'static str, min: BlockPos, max: BlockPos) -> Result<Size, StructureError> {
    let span = |lo: i32, hi: i32| {
        i32::try_from(i64::from(hi) - i64::from(lo) + 1)
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| StructureError::format(format, format!("extent {lo}..={hi} is too large")))
    };
    Ok(Size::new(span(min.x, max.x)?, span(min.y, max.y)?, span(min.z, max.z)?))
}

/// Collects blocks at absolute positions while a file is parsed.
#[derive(Debug, Default)]
pub struct SparseBuilder {
    blocks: FxHashMap<BlockPos, RuntimeId>,
    metadata: FxHashMap<BlockPos, NbtCompound>,
    min: Option<BlockPos>,
    max: Option<BlockPos>,
}

impl SparseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `id` at `pos`, replacing whatever was there.
    pub fn place(&mut self, pos: BlockPos, id: RuntimeId) {
        self.blocks.insert(pos, id);
        self.min = Some(match self.min {
            Some(m) => BlockPos::new(m.x.min(pos.x), m.y.min(pos.y), m.z.min(pos.z)),
            None => pos,
        });
        self.max = Some(match self.max {
            Some(m) => BlockPos::new(m.x.max(pos.x), m.y.max(pos.y), m.z.max(pos.z)),
            None => pos,
        });
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.blocks.contains_key(&pos)
    }

    /// Attaches a metadata record, replacing any earlier one.
    pub fn set_metadata(&mut self, pos: BlockPos, record: NbtCompound) {
        self.metadata.insert(pos, record);
    }

    /// Attaches a metadata record unless the position already has one.
    pub fn set_metadata_if_absent(&mut self, pos: BlockPos, record: NbtCompound) {
        self.metadata.entry(pos).or_insert(record);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Shifts every block so the minimum corner becomes the local origin.
    ///
    /// Metadata on positions without a block is dropped.
    pub fn finish(self, kind: Format, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            return Err(StructureError::format(kind.name(), "no block records"));
        };
        let size = extent(kind.name(), min, max)?;
        let air = registry.air();

        let mut records: Vec<BlockRecord> = self
            .blocks
            .into_iter()
            .map(|(pos, id)| BlockRecord::new(pos.x - min.x, pos.y - min.y, pos.z - min.z, id))
            .collect();
        records.sort_by_key(|r| (r.y, r.z, r.x));
        let non_air = records.iter().filter(|r| r.id != air).count();

        let mut metadata = Metadata::new();
        for (pos, record) in self.metadata {
            let local = BlockPos::new(pos.x - min.x, pos.y - min.y, pos.z - min.z);
            if size.contains(local.x, local.y, local.z) {
                metadata.insert(local, record);
            }
        }

        debug!(
            "Parsed {} document: {}x{}x{}, {} records, {} metadata records",
            kind,
            size.width,
            size.height,
            size.length,
            records.len(),
            metadata.len()
        );

        Ok(SparseStructure {
            kind,
            registry,
            bounds: BoundingBox::new(size),
            origin: min,
            records,
            metadata,
            non_air,
        })
    }
}

/// A parsed document held as a sorted record list.
pub struct SparseStructure {
    kind: Format,
    registry: SharedRegistry,
    bounds: BoundingBox,
    origin: BlockPos,
    records: Vec<BlockRecord>,
    metadata: Metadata,
    non_air: usize,
}

impl SparseStructure {
    /// Records sorted by Y, then Z, then X.
    pub fn records(&self) -> &[BlockRecord] {
        &self.records
    }
}

impl Structure for SparseStructure {
    fn kind(&self) -> Format {
        self.kind
    }

    fn registry(&self) -> &dyn BlockRegistry {
        self.registry.as_ref()
    }

    fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    fn bounds_mut(&mut self) -> &mut BoundingBox {
        &mut self.bounds
    }

    fn origin(&self) -> BlockPos {
        self.origin
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn visit_blocks(&self, selection: &Selection, visit: &mut dyn FnMut(BlockRecord)) -> Result<(), StructureError> {
        for record in &self.records {
            if selection.contains(record.x, record.y, record.z) {
                visit(*record);
            }
        }
        Ok(())
    }

    fn count_non_air_blocks(&self) -> Result<usize, StructureError> {
        Ok(self.non_air)
    }

    fn decode_layers(&self, sink: &mut LayerSink<'_>) -> Result<(), StructureError> {
        let layers = self.bounds.original_size().sub_chunk_layers();
        let mut rest = self.records.as_slice();
        for layer in 0..layers {
            let top = (layer + 1) * SUB_CHUNK_SIZE;
            let split = rest.partition_point(|r| r.y < top);
            let (current, tail) = rest.split_at(split);
            sink(layer, current.to_vec())?;
            rest = tail;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
