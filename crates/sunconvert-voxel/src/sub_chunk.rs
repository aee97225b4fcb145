//! Palette-compressed 16×16×16 sub-chunk storage with two block layers.
//!
//! Layer 0 holds the primary block; layer 1 holds the secondary block
//! (typically water inside a waterlogged block). Each layer keeps its own
//! palette of [`RuntimeId`]s and a bit-packed index array whose width grows
//! with the palette. A layer filled with a single block uses no index storage.

use serde::{Deserialize, Serialize};

use crate::bit_packed::{BitPackedArray, bits_for_palette};
use crate::coords::{SUB_CHUNK_SIZE, SUB_CHUNK_VOLUME};
use crate::registry::RuntimeId;

/// Number of block layers per sub-chunk.
pub const LAYER_COUNT: usize = 2;

/// One palette-compressed block layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Layer {
    palette: Vec<RuntimeId>,
    storage: BitPackedArray,
}

impl Layer {
    fn uniform(fill: RuntimeId) -> Self {
        Self {
            palette: vec![fill],
            storage: BitPackedArray::new(0, SUB_CHUNK_VOLUME),
        }
    }

    fn get(&self, index: usize) -> RuntimeId {
        self.palette[self.storage.get(index) as usize]
    }

    fn set(&mut self, index: usize, id: RuntimeId) {
        let palette_index = self.index_or_insert(id);
        self.storage.set(index, palette_index);
    }

    fn index_or_insert(&mut self, id: RuntimeId) -> u32 {
        if let Some(i) = self.palette.iter().position(|&p| p == id) {
            return i as u32;
        }
        self.palette.push(id);
        let needed = bits_for_palette(self.palette.len());
        if needed > self.storage.bits() {
            self.storage = self.storage.widened(needed);
        }
        (self.palette.len() - 1) as u32
    }

    fn is_uniform(&self, id: RuntimeId) -> bool {
        if self.storage.bits() == 0 {
            return self.palette[0] == id;
        }
        self.storage.iter().all(|i| self.palette[i as usize] == id)
    }
}

/// A 16×16×16 block volume with a primary and a secondary layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChunk {
    layers: [Layer; LAYER_COUNT],
}

impl SubChunk {
    /// Creates a sub-chunk whose every position holds `air` on both layers.
    pub fn new(air: RuntimeId) -> Self {
        Self {
            layers: [Layer::uniform(air), Layer::uniform(air)],
        }
    }

    /// Linear index of a local position, Y varying fastest.
    fn index(x: u8, y: u8, z: u8) -> usize {
        debug_assert!(
            i32::from(x) < SUB_CHUNK_SIZE && i32::from(y) < SUB_CHUNK_SIZE && i32::from(z) < SUB_CHUNK_SIZE
        );
        let size = SUB_CHUNK_SIZE as usize;
        (usize::from(x) * size + usize::from(z)) * size + usize::from(y)
    }

    /// Block at a local position on `layer`.
    ///
    /// # Panics
    ///
    /// Panics if `layer >= LAYER_COUNT`.
    pub fn block(&self, x: u8, y: u8, z: u8, layer: usize) -> RuntimeId {
        self.layers[layer].get(Self::index(x, y, z))
    }

    /// Replaces the block at a local position on `layer`.
    ///
    /// # Panics
    ///
    /// Panics if `layer >= LAYER_COUNT`.
    pub fn set_block(&mut self, x: u8, y: u8, z: u8, layer: usize, id: RuntimeId) {
        self.layers[layer].set(Self::index(x, y, z), id);
    }

    /// Returns `true` if both layers hold only `air`.
    pub fn is_empty(&self, air: RuntimeId) -> bool {
        self.layers.iter().all(|layer| layer.is_uniform(air))
    }

    /// Number of positions whose primary block is not `air`.
    pub fn non_air_count(&self, air: RuntimeId) -> usize {
        let layer = &self.layers[0];
        if layer.storage.bits() == 0 {
            return if layer.palette[0] == air { 0 } else { SUB_CHUNK_VOLUME };
        }
        layer
            .storage
            .iter()
            .filter(|&i| layer.palette[i as usize] != air)
            .count()
    }

    /// Palette of `layer` in index order.
    pub fn palette(&self, layer: usize) -> &[RuntimeId] {
        &self.layers[layer].palette
    }

    /// Bytes used by index storage across both layers.
    pub fn storage_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.storage.storage_bytes()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
