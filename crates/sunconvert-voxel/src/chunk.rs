//! A full-height chunk column assembled from sub-chunks.
//!
//! [`Chunk`] is what structure queries hand back: an air-filled column over a
//! [`WorldRange`] into which known blocks are placed by world Y.

use crate::coords::{SUB_CHUNK_SIZE, WorldRange, floor_div, floor_mod};
use crate::registry::RuntimeId;
use crate::sub_chunk::SubChunk;

/// Column of 16×16×16 sub-chunks covering a world height range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    range: WorldRange,
    air: RuntimeId,
    sub_chunks: Vec<SubChunk>,
}

impl Chunk {
    /// Creates an all-air column.
    pub fn new(range: WorldRange, air: RuntimeId) -> Self {
        Self {
            range,
            air,
            sub_chunks: vec![SubChunk::new(air); range.sub_chunk_count()],
        }
    }

    pub fn range(&self) -> WorldRange {
        self.range
    }

    fn slot(&self, y: i32) -> Option<usize> {
        if !self.range.contains(y) {
            return None;
        }
        Some((floor_div(y, SUB_CHUNK_SIZE) - self.range.min_sub_chunk()) as usize)
    }

    /// Block at local `x`/`z` and world `y`; air outside the height range.
    pub fn block(&self, x: u8, y: i32, z: u8, layer: usize) -> RuntimeId {
        match self.slot(y) {
            Some(slot) => self.sub_chunks[slot].block(x, floor_mod(y, SUB_CHUNK_SIZE) as u8, z, layer),
            None => self.air,
        }
    }

    /// Places a block. Returns `false` when `y` lies outside the height range.
    pub fn set_block(&mut self, x: u8, y: i32, z: u8, layer: usize, id: RuntimeId) -> bool {
        match self.slot(y) {
            Some(slot) => {
                self.sub_chunks[slot].set_block(x, floor_mod(y, SUB_CHUNK_SIZE) as u8, z, layer, id);
                true
            }
            None => false,
        }
    }

    /// Sub-chunk at sub-chunk index `sub_y`, if within range.
    pub fn sub_chunk(&self, sub_y: i32) -> Option<&SubChunk> {
        let slot = sub_y - self.range.min_sub_chunk();
        usize::try_from(slot).ok().and_then(|s| self.sub_chunks.get(s))
    }

    /// Sub-chunks with their sub-chunk Y index, bottom to top.
    pub fn sub_chunks(&self) -> impl Iterator<Item = (i32, &SubChunk)> {
        let base = self.range.min_sub_chunk();
        self.sub_chunks
            .iter()
            .enumerate()
            .map(move |(i, sub)| (base + i as i32, sub))
    }

    /// Number of non-air primary blocks in the column.
    pub fn non_air_count(&self) -> usize {
        self.sub_chunks
            .iter()
            .map(|sub| sub.non_air_count(self.air))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
