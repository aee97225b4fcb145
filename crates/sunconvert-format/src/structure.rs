//! The contract every structure format implements.
//!
//! A parsed document keeps its native extent, an offset, a palette already
//! resolved to runtime ids, and positional metadata. Block data is decoded on
//! demand through [`Structure::visit_blocks`], which only touches the part of
//! the document a [`Selection`] asks for.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use sunconvert_nbt::NbtCompound;
use sunconvert_voxel::{
    BlockPos, BlockRegistry, BoundingBox, Chunk, ChunkPos, Offset, RuntimeId, SUB_CHUNK_SIZE, Size, WorldRange,
};

use crate::Format;
use crate::error::StructureError;
use crate::selection::Selection;

/// Registry handle shared by a document and its queries.
pub type SharedRegistry = Arc<dyn BlockRegistry + Send + Sync>;

/// Positional metadata keyed by document-local position.
pub type Metadata = BTreeMap<BlockPos, NbtCompound>;

/// One decoded block in document-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// `0` for the primary block, `1` for the secondary (waterlog) block.
    pub layer: usize,
    pub id: RuntimeId,
}

impl BlockRecord {
    pub fn new(x: i32, y: i32, z: i32, id: RuntimeId) -> Self {
        Self { x, y, z, layer: 0, id }
    }

    pub fn pos(&self) -> BlockPos {
        BlockPos::new(self.x, self.y, self.z)
    }
}

/// Receives the blocks of one 16-high sub-chunk layer at a time.
pub type LayerSink<'a> = dyn FnMut(i32, Vec<BlockRecord>) -> Result<(), StructureError> + 'a;

/// Groups records arriving in ascending Y into per-layer batches.
///
/// Used by formats whose block array is Y-major, so a single pass can feed a
/// [`LayerSink`]. Empty layers are still handed to the sink.
pub(crate) struct LayerCollector<'s, 'a> {
    sink: &'s mut LayerSink<'a>,
    layer: i32,
    pending: Vec<BlockRecord>,
}

impl<'s, 'a> LayerCollector<'s, 'a> {
    pub(crate) fn new(sink: &'s mut LayerSink<'a>) -> Self {
        Self {
            sink,
            layer: 0,
            pending: Vec::new(),
        }
    }

    /// Flushes every layer below `y`.
    pub(crate) fn advance_to(&mut self, y: i32) -> Result<(), StructureError> {
        while y >= (self.layer + 1) * SUB_CHUNK_SIZE {
            (self.sink)(self.layer, std::mem::take(&mut self.pending))?;
            self.layer += 1;
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, record: BlockRecord) -> Result<(), StructureError> {
        self.advance_to(record.y)?;
        self.pending.push(record);
        Ok(())
    }

    /// Flushes the remaining layers up to `layers`.
    pub(crate) fn finish(mut self, layers: i32) -> Result<(), StructureError> {
        while self.layer < layers {
            (self.sink)(self.layer, std::mem::take(&mut self.pending))?;
            self.layer += 1;
        }
        Ok(())
    }
}

/// A parsed structure document.
pub trait Structure {
    fn kind(&self) -> Format;

    fn registry(&self) -> &dyn BlockRegistry;

    fn bounds(&self) -> &BoundingBox;

    fn bounds_mut(&mut self) -> &mut BoundingBox;

    /// World position the structure was cut from, for provenance only.
    fn origin(&self) -> BlockPos {
        BlockPos::default()
    }

    fn metadata(&self) -> &Metadata;

    /// Calls `visit` for the blocks inside `selection`. Air may be omitted.
    fn visit_blocks(
        &self,
        selection: &Selection,
        visit: &mut dyn FnMut(BlockRecord),
    ) -> Result<(), StructureError>;

    fn count_non_air_blocks(&self) -> Result<usize, StructureError>;

    /// Hands `sink` the blocks of each sub-chunk layer, bottom to top.
    ///
    /// The default runs one selective pass per layer; dense formats stored
    /// Y-major override it with a single pass.
    fn decode_layers(&self, sink: &mut LayerSink<'_>) -> Result<(), StructureError> {
        let size = self.bounds().original_size();
        for layer in 0..size.sub_chunk_layers() {
            let mut records = Vec::new();
            self.visit_blocks(&Selection::layer(size, layer), &mut |r| records.push(r))?;
            sink(layer, records)?;
        }
        Ok(())
    }

    /// Releases held resources. Documents hold no open handles between
    /// queries, so the default does nothing.
    fn close(&mut self) {}

    fn offset_pos(&self) -> Offset {
        self.bounds().offset()
    }

    fn set_offset_pos(&mut self, offset: Offset) {
        self.bounds_mut().set_offset(offset);
    }

    /// Size grown by the current offset.
    fn size(&self) -> Size {
        self.bounds().size()
    }

    /// Air-filled overworld columns for `positions` with the document's
    /// blocks placed at `local + offset`, local Y 0 sitting at the bottom of
    /// the world.
    fn get_chunks(&self, positions: &[ChunkPos]) -> Result<FxHashMap<ChunkPos, Chunk>, StructureError> {
        let range = WorldRange::OVERWORLD;
        let air = self.registry().air();
        let mut chunks: FxHashMap<ChunkPos, Chunk> =
            positions.iter().map(|&p| (p, Chunk::new(range, air))).collect();
        let offset = self.offset_pos();
        let selection = Selection::chunks(self.bounds().original_size(), offset, positions);
        if selection.is_empty() {
            return Ok(chunks);
        }
        self.visit_blocks(&selection, &mut |record| {
            let pos = BlockPos::new(
                record.x + offset.x,
                range.min_y + record.y + offset.y,
                record.z + offset.z,
            );
            if let Some(chunk) = chunks.get_mut(&pos.chunk()) {
                let (lx, _, lz) = pos.local();
                chunk.set_block(lx, pos.y, lz, record.layer, record.id);
            }
        })?;
        Ok(chunks)
    }

    /// Metadata records inside `positions`, keyed by the same world
    /// positions [`get_chunks`](Self::get_chunks) places blocks at.
    fn get_chunks_nbt(
        &self,
        positions: &[ChunkPos],
    ) -> Result<FxHashMap<ChunkPos, BTreeMap<BlockPos, NbtCompound>>, StructureError> {
        let range = WorldRange::OVERWORLD;
        let offset = self.offset_pos();
        let mut out: FxHashMap<ChunkPos, BTreeMap<BlockPos, NbtCompound>> = FxHashMap::default();
        for (local, record) in self.metadata() {
            let pos = BlockPos::new(
                local.x + offset.x,
                range.min_y + local.y + offset.y,
                local.z + offset.z,
            );
            let chunk = pos.chunk();
            if positions.contains(&chunk) {
                out.entry(chunk).or_default().insert(pos, record.clone());
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_registry, FixedStructure};

    #[test]
    fn test_get_chunks_places_with_offset() {
        let registry = test_registry();
        let stone = registry.lookup_name("minecraft:stone").unwrap();
        let mut doc = FixedStructure::new(
            registry.clone(),
            Size::new(2, 1, 1),
            vec![BlockRecord::new(0, 0, 0, stone), BlockRecord::new(1, 0, 0, stone)],
        );
        doc.set_offset_pos(Offset::new(15, 64, 0));
        assert_eq!(doc.size(), Size::new(17, 65, 1));

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0), ChunkPos::new(1, 0)]).unwrap();
        assert_eq!(chunks[&ChunkPos::new(0, 0)].block(15, 0, 0, 0), stone);
        assert_eq!(chunks[&ChunkPos::new(1, 0)].block(0, 0, 0, 0), stone);
        assert_eq!(chunks[&ChunkPos::new(0, 0)].non_air_count(), 1);
    }

    #[test]
    fn test_get_chunks_nbt_uses_world_positions() {
        let registry = test_registry();
        let mut doc = FixedStructure::new(registry, Size::new(1, 1, 1), Vec::new());
        let mut record = NbtCompound::new();
        record.insert("id", "Chest");
        doc.metadata.insert(BlockPos::new(0, 0, 0), record);
        doc.set_offset_pos(Offset::new(-1, 0, 0));

        let nbt = doc.get_chunks_nbt(&[ChunkPos::new(-1, 0)]).unwrap();
        let column = &nbt[&ChunkPos::new(-1, 0)];
        assert!(column.contains_key(&BlockPos::new(-1, -64, 0)));
        assert!(doc.get_chunks_nbt(&[ChunkPos::new(0, 0)]).unwrap().is_empty());
    }

    #[test]
    fn test_default_decode_layers_splits_by_sixteen() {
        let registry = test_registry();
        let stone = registry.lookup_name("minecraft:stone").unwrap();
        let doc = FixedStructure::new(
            registry,
            Size::new(1, 20, 1),
            vec![BlockRecord::new(0, 3, 0, stone), BlockRecord::new(0, 17, 0, stone)],
        );
        let mut layers = Vec::new();
        doc.decode_layers(&mut |layer, records| {
            layers.push((layer, records.len()));
            Ok(())
        })
        .unwrap();
        assert_eq!(layers, vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn test_layer_collector_emits_empty_layers() {
        let mut layers = Vec::new();
        let mut sink = |layer: i32, records: Vec<BlockRecord>| -> Result<(), StructureError> {
            layers.push((layer, records.len()));
            Ok(())
        };
        let mut collector = LayerCollector::new(&mut sink);
        collector.push(BlockRecord::new(0, 2, 0, 1)).unwrap();
        collector.push(BlockRecord::new(0, 33, 0, 1)).unwrap();
        collector.finish(4).unwrap();
        assert_eq!(layers, vec![(0, 1), (1, 0), (2, 1), (3, 0)]);
    }
}
