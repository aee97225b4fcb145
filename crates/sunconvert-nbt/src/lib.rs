//! Streaming reader/writer for NBT tagged documents in both byte orders.
//!
//! Values are materialised as `quartz_nbt` trees; the reader and writer here
//! add byte offsets and little-endian support on top.

pub mod error;
pub mod reader;
pub mod tag;
pub mod writer;

pub use error::NbtError;
pub use reader::{BedrockReader, JavaReader, MAX_DEPTH, NbtReader};
pub use tag::{CompoundExt, NbtCompound, NbtList, NbtTag, TagExt, TagType, list_element_type};
pub use writer::{BedrockWriter, JavaWriter, NbtWriter};
