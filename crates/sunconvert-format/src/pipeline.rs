//! Conversion between parsed documents and a voxel world.
//!
//! The decode direction ([`to_world`]) streams a document one sub-chunk layer
//! at a time into the world. The encode direction reads a world region through
//! [`RegionScan`], which visits blocks in a fixed order so repeated runs over
//! an unchanged region produce identical output.

use std::time::Instant;

use rustc_hash::FxHashMap;
use sunconvert_nbt::{CompoundExt, NbtCompound, NbtTag};
use sunconvert_voxel::{
    Area, BlockPos, BlockRegistry, ChunkPos, Dimension, RuntimeId, SUB_CHUNK_SIZE, SubChunk, SubChunkPos, World, floor_div,
    floor_mod,
};
use tracing::{debug, info};

use crate::error::StructureError;
use crate::structure::Structure;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress observer. Called synchronously on the converting thread.
pub trait Progress {
    /// Called once before work begins with the number of units to expect.
    fn start(&mut self, total: usize);

    /// Called once per completed unit.
    fn tick(&mut self);
}

/// Ignores all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _total: usize) {}

    fn tick(&mut self) {}
}

/// Adapts a pair of closures to [`Progress`].
pub struct ProgressFn<S, T> {
    on_start: S,
    on_tick: T,
}

impl<S: FnMut(usize), T: FnMut()> ProgressFn<S, T> {
    pub fn new(on_start: S, on_tick: T) -> Self {
        Self { on_start, on_tick }
    }
}

impl<S: FnMut(usize), T: FnMut()> Progress for ProgressFn<S, T> {
    fn start(&mut self, total: usize) {
        (self.on_start)(total);
    }

    fn tick(&mut self) {
        (self.on_tick)();
    }
}

// ---------------------------------------------------------------------------
// Decode direction
// ---------------------------------------------------------------------------

/// Writes a document into `world` with its local origin at the minimum corner
/// of `start`.
///
/// Each layer is decoded, grouped into fresh sub-chunks and saved before the
/// next layer is touched; sub-chunks holding only air are not written. One
/// progress tick is reported per layer. Metadata records are then appended to
/// their chunk columns with absolute `x`/`y`/`z` tags.
pub fn to_world(
    structure: &dyn Structure,
    world: &mut dyn World,
    dimension: Dimension,
    start: SubChunkPos,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let started = Instant::now();
    let size = structure.bounds().original_size();
    let air = structure.registry().air();
    let layers = size.sub_chunk_layers();
    info!(
        "Writing {} structure of {}x{}x{} into world at sub-chunk ({}, {}, {})",
        structure.kind(),
        size.width,
        size.height,
        size.length,
        start.x,
        start.y,
        start.z
    );
    progress.start(layers.max(0) as usize);

    let mut saved = 0usize;
    structure.decode_layers(&mut |layer, records| {
        let mut subs: FxHashMap<(i32, i32), SubChunk> = FxHashMap::default();
        for record in records {
            if record.id == air {
                continue;
            }
            let key = (floor_div(record.x, SUB_CHUNK_SIZE), floor_div(record.z, SUB_CHUNK_SIZE));
            subs.entry(key).or_insert_with(|| SubChunk::new(air)).set_block(
                floor_mod(record.x, SUB_CHUNK_SIZE) as u8,
                (record.y - layer * SUB_CHUNK_SIZE) as u8,
                floor_mod(record.z, SUB_CHUNK_SIZE) as u8,
                record.layer,
                record.id,
            );
        }
        let mut keys: Vec<_> = subs.keys().copied().collect();
        keys.sort();
        for key in keys {
            if let Some(sub) = subs.remove(&key) {
                if sub.is_empty(air) {
                    continue;
                }
                let pos = SubChunkPos::new(start.x + key.0, start.y + layer, start.z + key.1);
                world.save_sub_chunk(dimension, pos, sub)?;
                saved += 1;
            }
        }
        progress.tick();
        Ok(())
    })?;

    let origin = start.min_block();
    let mut columns: FxHashMap<ChunkPos, Vec<NbtCompound>> = FxHashMap::default();
    for (local, record) in structure.metadata() {
        let pos = BlockPos::new(origin.x + local.x, origin.y + local.y, origin.z + local.z);
        let mut record = record.clone();
        record.insert("x", NbtTag::Int(pos.x));
        record.insert("y", NbtTag::Int(pos.y));
        record.insert("z", NbtTag::Int(pos.z));
        columns.entry(pos.chunk()).or_default().push(record);
    }
    let metadata_count: usize = columns.values().map(Vec::len).sum();
    for (column, records) in columns {
        let mut existing = world.load_nbt(dimension, column)?;
        existing.extend(records);
        world.save_nbt(dimension, column, existing)?;
    }

    info!(
        "Wrote {} sub-chunks and {} metadata records in {:.2?}",
        saved,
        metadata_count,
        started.elapsed()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Encode direction
// ---------------------------------------------------------------------------

/// Caller-supplied settings for the encode direction.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeOptions {
    /// Author recorded by formats that store one.
    pub author: String,
    /// Gzip level, 0 to 9.
    pub gzip_level: u32,
    /// Brotli quality, 0 to 11.
    pub brotli_quality: u32,
    /// Litematic `MinecraftDataVersion`.
    pub data_version: i32,
    /// McStructure `format_version`.
    pub mcstructure_format_version: i32,
    /// Dimension the region is read from.
    pub dimension: Dimension,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            author: "SunConvert".to_string(),
            gzip_level: 6,
            brotli_quality: 6,
            data_version: 3700,
            mcstructure_format_version: 1,
            dimension: Dimension::Overworld,
        }
    }
}

/// Sub-chunk visiting order for sub-chunk-major encoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubChunkOrder {
    /// Z outermost, then X, then Y.
    ZXY,
    /// Y outermost, then Z, then X.
    YZX,
}

/// Reads a world region block by block in fixed orders.
///
/// Sub-chunks are loaded once per slab and dropped when the scan moves past
/// them. Positions handed to visitors are relative to the area's min corner.
pub struct RegionScan<'w> {
    world: &'w dyn World,
    dimension: Dimension,
    area: Area,
    air: RuntimeId,
    cache: FxHashMap<SubChunkPos, Option<SubChunk>>,
}

impl<'w> RegionScan<'w> {
    pub fn new(world: &'w dyn World, dimension: Dimension, area: Area, air: RuntimeId) -> Self {
        Self {
            world,
            dimension,
            area,
            air,
            cache: FxHashMap::default(),
        }
    }

    pub fn area(&self) -> Area {
        self.area
    }

    fn block(&mut self, pos: BlockPos, layer: usize) -> Result<RuntimeId, StructureError> {
        let key = pos.sub_chunk();
        if !self.cache.contains_key(&key) {
            let loaded = self.world.load_sub_chunk(self.dimension, key)?;
            self.cache.insert(key, loaded);
        }
        let (x, y, z) = pos.local();
        Ok(match self.cache.get(&key) {
            Some(Some(sub)) => sub.block(x, y, z, layer),
            _ => self.air,
        })
    }

    /// Number of 16-high slabs [`for_each_yzx`](Self::for_each_yzx) ticks for.
    pub fn yzx_units(&self) -> usize {
        (self.area.sub_chunk_max().y - self.area.sub_chunk_min().y + 1) as usize
    }

    /// Number of 16-wide slabs [`for_each_xyz`](Self::for_each_xyz) ticks for.
    pub fn xyz_units(&self) -> usize {
        (self.area.sub_chunk_max().x - self.area.sub_chunk_min().x + 1) as usize
    }

    /// Visits every position with Y outermost, then Z, then X.
    pub fn for_each_yzx<F>(&mut self, layer: usize, progress: &mut dyn Progress, mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(BlockPos, RuntimeId) -> Result<(), StructureError>,
    {
        let (min, max) = (self.area.min(), self.area.max());
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                for x in min.x..=max.x {
                    let id = self.block(BlockPos::new(x, y, z), layer)?;
                    visit(BlockPos::new(x - min.x, y - min.y, z - min.z), id)?;
                }
            }
            if y == max.y || floor_mod(y, SUB_CHUNK_SIZE) == SUB_CHUNK_SIZE - 1 {
                self.cache.clear();
                progress.tick();
            }
        }
        Ok(())
    }

    /// Visits every position with X outermost, then Y, then Z.
    pub fn for_each_xyz<F>(&mut self, layer: usize, progress: &mut dyn Progress, mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(BlockPos, RuntimeId) -> Result<(), StructureError>,
    {
        let (min, max) = (self.area.min(), self.area.max());
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    let id = self.block(BlockPos::new(x, y, z), layer)?;
                    visit(BlockPos::new(x - min.x, y - min.y, z - min.z), id)?;
                }
            }
            if x == max.x || floor_mod(x, SUB_CHUNK_SIZE) == SUB_CHUNK_SIZE - 1 {
                self.cache.clear();
                progress.tick();
            }
        }
        Ok(())
    }

    /// Sub-chunks covering the area in `order`.
    pub fn sub_chunks(&self, order: SubChunkOrder) -> Vec<SubChunkPos> {
        let (lo, hi) = (self.area.sub_chunk_min(), self.area.sub_chunk_max());
        let mut out = Vec::with_capacity(self.area.sub_chunk_count());
        match order {
            SubChunkOrder::ZXY => {
                for z in lo.z..=hi.z {
                    for x in lo.x..=hi.x {
                        for y in lo.y..=hi.y {
                            out.push(SubChunkPos::new(x, y, z));
                        }
                    }
                }
            }
            SubChunkOrder::YZX => {
                for y in lo.y..=hi.y {
                    for z in lo.z..=hi.z {
                        for x in lo.x..=hi.x {
                            out.push(SubChunkPos::new(x, y, z));
                        }
                    }
                }
            }
        }
        out
    }

    /// Visits the part of one sub-chunk inside the area, X outermost, then
    /// Y, then Z. Unwritten sub-chunks are skipped entirely.
    pub fn for_each_in_sub_chunk<F>(&mut self, pos: SubChunkPos, layer: usize, mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(BlockPos, RuntimeId) -> Result<(), StructureError>,
    {
        let Some(sub) = self.world.load_sub_chunk(self.dimension, pos)? else {
            return Ok(());
        };
        let base = pos.min_block();
        let (min, max) = (self.area.min(), self.area.max());
        let clamp = |lo: i32, hi: i32, b: i32| (lo.max(b), hi.min(b + SUB_CHUNK_SIZE - 1));
        let (x0, x1) = clamp(min.x, max.x, base.x);
        let (y0, y1) = clamp(min.y, max.y, base.y);
        let (z0, z1) = clamp(min.z, max.z, base.z);
        for x in x0..=x1 {
            for y in y0..=y1 {
                for z in z0..=z1 {
                    let id = sub.block((x - base.x) as u8, (y - base.y) as u8, (z - base.z) as u8, layer);
                    visit(BlockPos::new(x - min.x, y - min.y, z - min.z), id)?;
                }
            }
        }
        Ok(())
    }

    /// Metadata records whose `x`/`y`/`z` lie inside the area, keyed by
    /// area-local position in sorted order.
    pub fn metadata(&self) -> Result<Vec<(BlockPos, NbtCompound)>, StructureError> {
        let (lo, hi) = (self.area.min().chunk(), self.area.max().chunk());
        let mut out = Vec::new();
        for cx in lo.x..=hi.x {
            for cz in lo.z..=hi.z {
                for record in self.world.load_nbt(self.dimension, ChunkPos::new(cx, cz))? {
                    let (Some(x), Some(y), Some(z)) =
                        (record.get_i32("x"), record.get_i32("y"), record.get_i32("z"))
                    else {
                        continue;
                    };
                    let pos = BlockPos::new(x, y, z);
                    if self.area.contains(pos) {
                        out.push((self.area.to_local(pos), record));
                    }
                }
            }
        }
        out.sort_by_key(|(pos, _)| *pos);
        debug!("Collected {} metadata records from region", out.len());
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
