//! Voxel-side building blocks for structure conversion: coordinates, block
//! registry, bit-packed index arrays, and sub-chunk/world storage.

pub mod bit_packed;
pub mod chunk;
pub mod coords;
pub mod registry;
pub mod select;
pub mod sub_chunk;
pub mod world;

pub use bit_packed::{BitPackedArray, PackError, PackedReader, PackedWriter, bits_for_palette, packed_word_count};
pub use chunk::Chunk;
pub use coords::{
    Area, AreaError, BlockPos, BoundingBox, ChunkPos, Offset, SUB_CHUNK_SIZE, SUB_CHUNK_VOLUME, Size, SubChunkPos,
    WorldRange, floor_div, floor_mod,
};
pub use registry::{
    BlockDescriptor, BlockProperties, BlockRegistry, BlockState, BlockTable, PaletteBuilder, PaletteResolver,
    RegistryError, RuntimeId, StateValue,
};
pub use select::ElementSource;
pub use sub_chunk::SubChunk;
pub use world::{Dimension, MemoryWorld, World, WorldError};
