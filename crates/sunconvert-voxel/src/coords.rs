//! Block, chunk, and sub-chunk coordinates plus the bounding box every
//! structure document carries.
//!
//! World coordinates split into a chunk index and a local offset with
//! [`floor_div`] / [`floor_mod`], which round toward negative infinity so that
//! `-1` lands in chunk `-1` at local `15` rather than chunk `0`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side length of a chunk column and of a sub-chunk cube, in blocks.
pub const SUB_CHUNK_SIZE: i32 = 16;

/// Number of blocks in one sub-chunk (16³).
pub const SUB_CHUNK_VOLUME: usize = 16 * 16 * 16;

/// Floor division: rounds toward negative infinity.
///
/// `divisor` must be positive.
#[inline]
pub fn floor_div(value: i32, divisor: i32) -> i32 {
    debug_assert!(divisor > 0, "divisor must be positive");
    value.div_euclid(divisor)
}

/// Floor modulo: always in `0..divisor` for a positive divisor.
#[inline]
pub fn floor_mod(value: i32, divisor: i32) -> i32 {
    debug_assert!(divisor > 0, "divisor must be positive");
    value.rem_euclid(divisor)
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Absolute or structure-local block position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk column containing this position.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::new(
            floor_div(self.x, SUB_CHUNK_SIZE),
            floor_div(self.z, SUB_CHUNK_SIZE),
        )
    }

    /// Sub-chunk containing this position.
    pub fn sub_chunk(self) -> SubChunkPos {
        SubChunkPos::new(
            floor_div(self.x, SUB_CHUNK_SIZE),
            floor_div(self.y, SUB_CHUNK_SIZE),
            floor_div(self.z, SUB_CHUNK_SIZE),
        )
    }

    /// Position inside its sub-chunk, each component in `0..16`.
    pub fn local(self) -> (u8, u8, u8) {
        (
            floor_mod(self.x, SUB_CHUNK_SIZE) as u8,
            floor_mod(self.y, SUB_CHUNK_SIZE) as u8,
            floor_mod(self.z, SUB_CHUNK_SIZE) as u8,
        )
    }

    /// Returns this position shifted by `offset`.
    pub fn shifted(self, offset: Offset) -> Self {
        Self::new(self.x + offset.x, self.y + offset.y, self.z + offset.z)
    }
}

/// Horizontal position of a chunk column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// World X of the column's western edge.
    pub fn min_block_x(self) -> i32 {
        self.x * SUB_CHUNK_SIZE
    }

    /// World Z of the column's northern edge.
    pub fn min_block_z(self) -> i32 {
        self.z * SUB_CHUNK_SIZE
    }
}

/// Position of a 16×16×16 sub-chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SubChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this sub-chunk belongs to.
    pub fn column(self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }

    /// World position of the sub-chunk's minimum corner.
    pub fn min_block(self) -> BlockPos {
        BlockPos::new(
            self.x * SUB_CHUNK_SIZE,
            self.y * SUB_CHUNK_SIZE,
            self.z * SUB_CHUNK_SIZE,
        )
    }
}

/// Translation applied to a structure before it is queried by chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Offset {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

// ---------------------------------------------------------------------------
// Sizes and bounding boxes
// ---------------------------------------------------------------------------

/// Extent of a structure in blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
    pub length: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32, length: i32) -> Self {
        Self {
            width,
            height,
            length,
        }
    }

    /// Total number of block positions.
    pub fn volume(self) -> usize {
        (self.width.max(0) as usize)
            .saturating_mul(self.height.max(0) as usize)
            .saturating_mul(self.length.max(0) as usize)
    }

    /// Number of chunk columns covering the X/Z footprint.
    pub fn chunk_count(self) -> usize {
        self.chunks_x() as usize * self.chunks_z() as usize
    }

    /// Chunk columns along X.
    pub fn chunks_x(self) -> i32 {
        (self.width.max(0) + SUB_CHUNK_SIZE - 1) / SUB_CHUNK_SIZE
    }

    /// Chunk columns along Z.
    pub fn chunks_z(self) -> i32 {
        (self.length.max(0) + SUB_CHUNK_SIZE - 1) / SUB_CHUNK_SIZE
    }

    /// Sub-chunk layers along Y.
    pub fn sub_chunk_layers(self) -> i32 {
        (self.height.max(0) + SUB_CHUNK_SIZE - 1) / SUB_CHUNK_SIZE
    }

    /// Returns `true` if the position lies inside `0..size` on every axis.
    pub fn contains(self, x: i32, y: i32, z: i32) -> bool {
        (0..self.width).contains(&x) && (0..self.height).contains(&y) && (0..self.length).contains(&z)
    }
}

/// Native extent of a parsed document together with its current offset.
///
/// Applying an offset grows the reported size by the offset's magnitude on
/// each axis: `size = original + |offset|`. The original extent never changes
/// after parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    original: Size,
    size: Size,
    offset: Offset,
}

impl BoundingBox {
    /// Creates a bounding box with zero offset.
    pub fn new(original: Size) -> Self {
        Self {
            original,
            size: original,
            offset: Offset::default(),
        }
    }

    /// Extent as parsed.
    pub fn original_size(&self) -> Size {
        self.original
    }

    /// Extent after the current offset has been applied.
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Replaces the offset and recomputes the grown size.
    pub fn set_offset(&mut self, offset: Offset) {
        self.offset = offset;
        self.size = Size::new(
            self.original.width + offset.x.abs(),
            self.original.height + offset.y.abs(),
            self.original.length + offset.z.abs(),
        );
    }
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

/// Errors produced when building an [`Area`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AreaError {
    /// One of the requested dimensions is zero or negative.
    #[error("area size must be positive on every axis, got {0:?}")]
    NonPositiveSize(Size),
}

/// Inclusive box of world blocks selected for encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Area {
    min: BlockPos,
    max: BlockPos,
}

impl Area {
    /// Normalizes two arbitrary corners into a min/max box.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Builds an area from its minimum corner and a positive size.
    pub fn new(min: BlockPos, size: Size) -> Result<Self, AreaError> {
        if size.width <= 0 || size.height <= 0 || size.length <= 0 {
            return Err(AreaError::NonPositiveSize(size));
        }
        Ok(Self {
            min,
            max: BlockPos::new(
                min.x + size.width - 1,
                min.y + size.height - 1,
                min.z + size.length - 1,
            ),
        })
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn size(&self) -> Size {
        Size::new(
            self.max.x - self.min.x + 1,
            self.max.y - self.min.y + 1,
            self.max.z - self.min.z + 1,
        )
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// First sub-chunk touched by the area.
    pub fn sub_chunk_min(&self) -> SubChunkPos {
        self.min.sub_chunk()
    }

    /// Last sub-chunk touched by the area (inclusive).
    pub fn sub_chunk_max(&self) -> SubChunkPos {
        self.max.sub_chunk()
    }

    /// Number of sub-chunks covering the area.
    pub fn sub_chunk_count(&self) -> usize {
        let lo = self.sub_chunk_min();
        let hi = self.sub_chunk_max();
        (hi.x - lo.x + 1) as usize * (hi.y - lo.y + 1) as usize * (hi.z - lo.z + 1) as usize
    }

    /// Converts a world position into area-local coordinates.
    pub fn to_local(&self, pos: BlockPos) -> BlockPos {
        BlockPos::new(pos.x - self.min.x, pos.y - self.min.y, pos.z - self.min.z)
    }
}

/// Vertical extent of a chunk column, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldRange {
    pub min_y: i32,
    pub max_y: i32,
}

impl WorldRange {
    /// Overworld height range, `-64..=319`.
    pub const OVERWORLD: WorldRange = WorldRange {
        min_y: -64,
        max_y: 319,
    };

    /// Lowest sub-chunk index of the range.
    pub fn min_sub_chunk(&self) -> i32 {
        floor_div(self.min_y, SUB_CHUNK_SIZE)
    }

    /// Number of sub-chunks stacked in one column.
    pub fn sub_chunk_count(&self) -> usize {
        (floor_div(self.max_y, SUB_CHUNK_SIZE) - self.min_sub_chunk() + 1) as usize
    }

    pub fn contains(&self, y: i32) -> bool {
        (self.min_y..=self.max_y).contains(&y)
    }
}

impl Default for WorldRange {
    fn default() -> Self {
        Self::OVERWORLD
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_div_negative() {
        assert_eq!(floor_div(-1, 16), -1);
        assert_eq!(floor_div(-16, 16), -1);
        assert_eq!(floor_div(-17, 16), -2);
        assert_eq!(floor_div(15, 16), 0);
        assert_eq!(floor_div(16, 16), 1);
    }

    #[test]
    fn test_floor_mod_negative() {
        assert_eq!(floor_mod(-1, 16), 15);
        assert_eq!(floor_mod(-16, 16), 0);
        assert_eq!(floor_mod(-17, 16), 15);
        assert_eq!(floor_mod(33, 16), 1);
    }

    #[test]
    fn test_negative_block_maps_to_previous_chunk() {
        let pos = BlockPos::new(-1, 5, 0);
        assert_eq!(pos.chunk(), ChunkPos::new(-1, 0));
        assert_eq!(pos.local().0, 15);
    }

    #[test]
    fn test_offset_grows_size() {
        let mut bounds = BoundingBox::new(Size::new(10, 5, 10));
        bounds.set_offset(Offset::new(3, 0, -4));
        assert_eq!(bounds.size(), Size::new(13, 5, 14));
        assert_eq!(bounds.original_size(), Size::new(10, 5, 10));
    }

    #[test]
    fn test_offset_reassignment_uses_original() {
        let mut bounds = BoundingBox::new(Size::new(4, 4, 4));
        bounds.set_offset(Offset::new(10, 10, 10));
        bounds.set_offset(Offset::new(-1, 0, 0));
        assert_eq!(bounds.size(), Size::new(5, 4, 4));
    }

    #[test]
    fn test_area_from_corners_normalizes() {
        let area = Area::from_corners(BlockPos::new(5, -3, 20), BlockPos::new(-2, 10, 4));
        assert_eq!(area.min(), BlockPos::new(-2, -3, 4));
        assert_eq!(area.max(), BlockPos::new(5, 10, 20));
        assert_eq!(area.size(), Size::new(8, 14, 17));
    }

    #[test]
    fn test_area_sub_chunk_range() {
        let area = Area::from_corners(BlockPos::new(-1, 0, 0), BlockPos::new(16, 15, 15));
        assert_eq!(area.sub_chunk_min(), SubChunkPos::new(-1, 0, 0));
        assert_eq!(area.sub_chunk_max(), SubChunkPos::new(1, 0, 0));
        assert_eq!(area.sub_chunk_count(), 3);
    }

    #[test]
    fn test_area_rejects_non_positive_size() {
        let result = Area::new(BlockPos::default(), Size::new(0, 4, 4));
        assert!(matches!(result, Err(AreaError::NonPositiveSize(_))));
    }

    #[test]
    fn test_size_chunk_counts() {
        let size = Size::new(17, 40, 16);
        assert_eq!(size.chunks_x(), 2);
        assert_eq!(size.chunks_z(), 1);
        assert_eq!(size.sub_chunk_layers(), 3);
        assert_eq!(size.chunk_count(), 2);
        assert_eq!(size.volume(), 17 * 40 * 16);
    }

    #[test]
    fn test_overworld_range() {
        let range = WorldRange::OVERWORLD;
        assert_eq!(range.min_sub_chunk(), -4);
        assert_eq!(range.sub_chunk_count(), 24);
    }
}
