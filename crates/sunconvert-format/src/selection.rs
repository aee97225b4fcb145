//! Which blocks of a document a query needs, expressed in document-local
//! coordinates and turned into sorted index runs for selective decoding.

use std::ops::Range;

use sunconvert_voxel::select::normalize_runs;
use sunconvert_voxel::{ChunkPos, Offset, SUB_CHUNK_SIZE, Size};

/// Flattening of a dense `width × height × length` block array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOrder {
    /// `(y * length + z) * width + x`, X varying fastest.
    YZX,
    /// `x * height * length + y * length + z`, Z varying fastest.
    XYZ,
}

impl IndexOrder {
    pub fn index(self, size: Size, x: i32, y: i32, z: i32) -> usize {
        let (w, h, l) = (size.width as usize, size.height as usize, size.length as usize);
        let (x, y, z) = (x as usize, y as usize, z as usize);
        match self {
            IndexOrder::YZX => (y * l + z) * w + x,
            IndexOrder::XYZ => x * h * l + y * l + z,
        }
    }

    pub fn position(self, size: Size, index: usize) -> (i32, i32, i32) {
        let (w, h, l) = (size.width as usize, size.height as usize, size.length as usize);
        let (x, y, z) = match self {
            IndexOrder::YZX => (index % w, index / (w * l), (index / w) % l),
            IndexOrder::XYZ => (index / (h * l), (index / l) % h, index % l),
        };
        (x as i32, y as i32, z as i32)
    }
}

/// Half-open local box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LocalBox {
    min: [i32; 3],
    max: [i32; 3],
}

impl LocalBox {
    fn clamped(size: Size, min: [i32; 3], max: [i32; 3]) -> Option<Self> {
        let limit = [size.width, size.height, size.length];
        let mut out = LocalBox { min, max };
        for axis in 0..3 {
            out.min[axis] = out.min[axis].max(0);
            out.max[axis] = out.max[axis].min(limit[axis]);
            if out.min[axis] >= out.max[axis] {
                return None;
            }
        }
        Some(out)
    }

    fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        (self.min[0]..self.max[0]).contains(&x)
            && (self.min[1]..self.max[1]).contains(&y)
            && (self.min[2]..self.max[2]).contains(&z)
    }
}

/// A set of disjoint boxes inside a document's native extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    size: Size,
    boxes: Vec<LocalBox>,
}

impl Selection {
    /// Every block of the document.
    pub fn all(size: Size) -> Self {
        let boxes = LocalBox::clamped(size, [0; 3], [size.width, size.height, size.length])
            .into_iter()
            .collect();
        Self { size, boxes }
    }

    /// Blocks that land in `chunks` once `offset` is applied on X/Z.
    pub fn chunks(size: Size, offset: Offset, chunks: &[ChunkPos]) -> Self {
        let mut unique = chunks.to_vec();
        unique.sort();
        unique.dedup();
        let boxes = unique
            .into_iter()
            .filter_map(|c| {
                let x0 = c.min_block_x() - offset.x;
                let z0 = c.min_block_z() - offset.z;
                LocalBox::clamped(
                    size,
                    [x0, 0, z0],
                    [x0 + SUB_CHUNK_SIZE, size.height, z0 + SUB_CHUNK_SIZE],
                )
            })
            .collect();
        Self { size, boxes }
    }

    /// One 16-block-high slab, `layer * 16 ..` in local Y.
    pub fn layer(size: Size, layer: i32) -> Self {
        let y0 = layer * SUB_CHUNK_SIZE;
        let boxes = LocalBox::clamped(
            size,
            [0, y0, 0],
            [size.width, y0 + SUB_CHUNK_SIZE, size.length],
        )
        .into_iter()
        .collect();
        Self { size, boxes }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        self.boxes.iter().any(|b| b.contains(x, y, z))
    }

    /// Sorted, merged index runs covering the selection under `order`.
    pub fn runs(&self, order: IndexOrder) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        for b in &self.boxes {
            match order {
                IndexOrder::YZX => {
                    for y in b.min[1]..b.max[1] {
                        for z in b.min[2]..b.max[2] {
                            let start = order.index(self.size, b.min[0], y, z);
                            runs.push(start..start + (b.max[0] - b.min[0]) as usize);
                        }
                    }
                }
                IndexOrder::XYZ => {
                    for x in b.min[0]..b.max[0] {
                        for y in b.min[1]..b.max[1] {
                            let start = order.index(self.size, x, y, b.min[2]);
                            runs.push(start..start + (b.max[2] - b.min[2]) as usize);
                        }
                    }
                }
            }
        }
        normalize_runs(runs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_position_inverse() {
        let size = Size::new(3, 4, 5);
        for order in [IndexOrder::YZX, IndexOrder::XYZ] {
            for i in 0..size.volume() {
                let (x, y, z) = order.position(size, i);
                assert_eq!(order.index(size, x, y, z), i);
            }
        }
    }

    #[test]
    fn test_flattening_formulas() {
        let size = Size::new(3, 4, 5);
        assert_eq!(IndexOrder::YZX.index(size, 1, 2, 3), (2 * 5 + 3) * 3 + 1);
        assert_eq!(IndexOrder::XYZ.index(size, 1, 2, 3), 4 * 5 + 2 * 5 + 3);
    }

    #[test]
    fn test_all_is_single_run() {
        let size = Size::new(4, 3, 2);
        assert_eq!(Selection::all(size).runs(IndexOrder::YZX), vec![0..24]);
        assert_eq!(Selection::all(size).runs(IndexOrder::XYZ), vec![0..24]);
    }

    #[test]
    fn test_chunk_selection_with_offset() {
        let size = Size::new(40, 2, 10);
        let sel = Selection::chunks(size, Offset::new(-8, 0, 0), &[ChunkPos::new(0, 0)]);
        // Chunk 0 covers world x 0..16, i.e. local x 8..24.
        assert!(sel.contains(8, 0, 0));
        assert!(sel.contains(23, 1, 9));
        assert!(!sel.contains(7, 0, 0));
        assert!(!sel.contains(24, 0, 0));
        let runs = sel.runs(IndexOrder::YZX);
        assert_eq!(runs.len(), 20);
        assert_eq!(runs[0], 8..24);
    }

    #[test]
    fn test_chunk_outside_is_empty() {
        let size = Size::new(4, 4, 4);
        let sel = Selection::chunks(size, Offset::default(), &[ChunkPos::new(5, 5)]);
        assert!(sel.is_empty());
        assert!(sel.runs(IndexOrder::YZX).is_empty());
    }

    #[test]
    fn test_layer_clamps_to_height() {
        let size = Size::new(2, 20, 2);
        let top = Selection::layer(size, 1);
        assert!(top.contains(0, 16, 0));
        assert!(top.contains(1, 19, 1));
        assert!(!top.contains(0, 15, 0));
        assert!(Selection::layer(size, 2).is_empty());
    }
}
