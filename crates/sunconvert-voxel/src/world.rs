//! The voxel world collaborator and an in-memory implementation.
//!
//! Conversions only ever talk to a world through [`World`]: sub-chunks are
//! loaded and saved whole, and positional metadata (block-entity records) is
//! stored per chunk column.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sunconvert_nbt::NbtCompound;
use thiserror::Error;

use crate::coords::{BlockPos, ChunkPos, SubChunkPos, WorldRange};
use crate::registry::RuntimeId;
use crate::sub_chunk::SubChunk;

/// Errors reported by a [`World`] implementation.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The backing store rejected an operation.
    #[error("world storage error during {operation}: {reason}")]
    Storage {
        /// Operation that failed.
        operation: &'static str,
        /// Store-specific description.
        reason: String,
    },
    /// I/O failure in the backing store.
    #[error("world I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// World dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Vertical block range of the dimension.
    pub fn range(self) -> WorldRange {
        match self {
            Dimension::Overworld => WorldRange::OVERWORLD,
            Dimension::Nether => WorldRange { min_y: 0, max_y: 127 },
            Dimension::End => WorldRange { min_y: 0, max_y: 255 },
        }
    }
}

/// Chunked voxel storage.
pub trait World {
    /// Loads a sub-chunk, or `None` if it has never been written.
    fn load_sub_chunk(&self, dimension: Dimension, pos: SubChunkPos) -> Result<Option<SubChunk>, WorldError>;

    /// Stores a sub-chunk, replacing any previous contents.
    fn save_sub_chunk(&mut self, dimension: Dimension, pos: SubChunkPos, sub_chunk: SubChunk) -> Result<(), WorldError>;

    /// Loads the metadata records of a chunk column.
    fn load_nbt(&self, dimension: Dimension, pos: ChunkPos) -> Result<Vec<NbtCompound>, WorldError>;

    /// Replaces the metadata records of a chunk column.
    fn save_nbt(&mut self, dimension: Dimension, pos: ChunkPos, records: Vec<NbtCompound>) -> Result<(), WorldError>;
}

/// [`World`] held entirely in hash maps.
#[derive(Clone, Debug, Default)]
pub struct MemoryWorld {
    sub_chunks: FxHashMap<(Dimension, SubChunkPos), SubChunk>,
    nbt: FxHashMap<(Dimension, ChunkPos), Vec<NbtCompound>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one block; positions in unwritten sub-chunks read as `air`.
    pub fn block(&self, dimension: Dimension, pos: BlockPos, layer: usize, air: RuntimeId) -> RuntimeId {
        let (x, y, z) = pos.local();
        self.sub_chunks
            .get(&(dimension, pos.sub_chunk()))
            .map_or(air, |sub| sub.block(x, y, z, layer))
    }

    /// Writes one block, creating an air-filled sub-chunk when needed.
    pub fn set_block(&mut self, dimension: Dimension, pos: BlockPos, layer: usize, id: RuntimeId, air: RuntimeId) {
        let (x, y, z) = pos.local();
        self.sub_chunks
            .entry((dimension, pos.sub_chunk()))
            .or_insert_with(|| SubChunk::new(air))
            .set_block(x, y, z, layer, id);
    }

    /// Adds one metadata record to the column containing it.
    pub fn push_nbt(&mut self, dimension: Dimension, pos: ChunkPos, record: NbtCompound) {
        self.nbt.entry((dimension, pos)).or_default().push(record);
    }

    /// Positions of every stored sub-chunk in a dimension, sorted.
    pub fn sub_chunk_positions(&self, dimension: Dimension) -> Vec<SubChunkPos> {
        let mut positions: Vec<_> = self
            .sub_chunks
            .keys()
            .filter(|(d, _)| *d == dimension)
            .map(|&(_, pos)| pos)
            .collect();
        positions.sort();
        positions
    }

    /// Number of non-air primary blocks in a dimension.
    pub fn non_air_count(&self, dimension: Dimension, air: RuntimeId) -> usize {
        self.sub_chunks
            .iter()
            .filter(|((d, _), _)| *d == dimension)
            .map(|(_, sub)| sub.non_air_count(air))
            .sum()
    }
}

impl World for MemoryWorld {
    fn load_sub_chunk(&self, dimension: Dimension, pos: SubChunkPos) -> Result<Option<SubChunk>, WorldError> {
        Ok(self.sub_chunks.get(&(dimension, pos)).cloned())
    }

    fn save_sub_chunk(&mut self, dimension: Dimension, pos: SubChunkPos, sub_chunk: SubChunk) -> Result<(), WorldError> {
        self.sub_chunks.insert((dimension, pos), sub_chunk);
        Ok(())
    }

    fn load_nbt(&self, dimension: Dimension, pos: ChunkPos) -> Result<Vec<NbtCompound>, WorldError> {
        Ok(self.nbt.get(&(dimension, pos)).cloned().unwrap_or_default())
    }

    fn save_nbt(&mut self, dimension: Dimension, pos: ChunkPos, records: Vec<NbtCompound>) -> Result<(), WorldError> {
        if records.is_empty() {
            self.nbt.remove(&(dimension, pos));
        } else {
            self.nbt.insert((dimension, pos), records);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
