//! Fixtures shared by the format crate's unit tests.

use std::sync::Arc;

use sunconvert_voxel::registry::BlockTableEntry;
use sunconvert_voxel::{BlockProperties, BlockRegistry, BlockTable, BoundingBox, Size, StateValue};

use crate::Format;
use crate::error::StructureError;
use crate::selection::Selection;
use crate::structure::{BlockRecord, Metadata, SharedRegistry, Structure};

fn props(pairs: &[(&str, StateValue)]) -> BlockProperties {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// A small fixed registry:
///
/// | id | block |
/// |----|-------|
/// | 0 | air |
/// | 1 | stone (legacy 1:0) |
/// | 2 | dirt (legacy 3:0) |
/// | 3 | wool color=white (legacy 35:0) |
/// | 4 | wool color=red (legacy 35:14) |
/// | 5 | glass (legacy 20:0) |
/// | 6 | chest facing_direction=2 (legacy 54:2) |
/// | 7 | command_block conditional_bit=false (legacy 137:0) |
/// | 8 | water (legacy 9:0) |
/// | 9 | unknown |
pub(crate) fn test_registry() -> Arc<BlockTable> {
    let table = BlockTable::new(vec![
        BlockTableEntry::new("minecraft:stone").legacy(Some(1), 0),
        BlockTableEntry::new("minecraft:dirt").legacy(Some(3), 0),
        BlockTableEntry::new("minecraft:wool")
            .states(props(&[("color", StateValue::String("white".into()))]))
            .legacy(Some(35), 0),
        BlockTableEntry::new("minecraft:wool")
            .states(props(&[("color", StateValue::String("red".into()))]))
            .legacy(Some(35), 14),
        BlockTableEntry::new("minecraft:glass").legacy(Some(20), 0),
        BlockTableEntry::new("minecraft:chest")
            .states(props(&[("facing_direction", StateValue::Int(2))]))
            .legacy(Some(54), 2),
        BlockTableEntry::new("minecraft:command_block")
            .states(props(&[("conditional_bit", StateValue::Bool(false))]))
            .legacy(Some(137), 0),
        BlockTableEntry::new("minecraft:water").legacy(Some(9), 0),
    ]);
    match table {
        Ok(table) => Arc::new(table),
        Err(err) => panic!("test registry is invalid: {err}"),
    }
}

/// In-memory structure with a fixed record list.
pub(crate) struct FixedStructure {
    registry: SharedRegistry,
    bounds: BoundingBox,
    records: Vec<BlockRecord>,
    pub metadata: Metadata,
}

impl FixedStructure {
    pub fn new(registry: Arc<BlockTable>, size: Size, records: Vec<BlockRecord>) -> Self {
        Self {
            registry,
            bounds: BoundingBox::new(size),
            records,
            metadata: Metadata::new(),
        }
    }
}

impl Structure for FixedStructure {
    fn kind(&self) -> Format {
        Format::RunAway
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
        let air = self.registry.air();
        Ok(self.records.iter().filter(|r| r.id != air).count())
    }
}
