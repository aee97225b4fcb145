//! QingXu v1: a JSON object whose numbered entries are themselves JSON
//! documents, one per chunk, each holding numbered JSON point documents.
//! Read-only.

use std::path::Path;

use serde_json::{Map, Value};
use sunconvert_voxel::{BlockDescriptor, BlockPos, BlockRegistry, PaletteResolver, RuntimeId};
use tracing::debug;

use crate::Format;
use crate::entity::json_int;
use crate::error::StructureError;
use crate::source::{ReadSession, Transport};
use crate::sparse::{SparseBuilder, SparseStructure};
use crate::structure::SharedRegistry;

const NAME: &str = "qingxu_v1";

/// Key of the chunk count in the root object.
pub(crate) const TOTAL_BLOCKS: &str = "totalBlocks";
const TOTAL_POINTS: &str = "totalPoints";

/// Count field as a non-negative integer.
fn count(object: &Map<String, Value>, key: &str) -> Result<Option<u64>, StructureError> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => json_int(value)
            .map(|n| Some(n.max(0) as u64))
            .ok_or_else(|| StructureError::format(NAME, format!("{key} is not an integer"))),
    }
}

/// Entry `index` decoded as an embedded JSON object. Missing and blank
/// entries are skipped.
fn embedded(object: &Map<String, Value>, index: u64, what: &str) -> Result<Option<Map<String, Value>>, StructureError> {
    let Some(value) = object.get(&index.to_string()) else {
        return Ok(None);
    };
    let Value::String(text) = value else {
        return Err(StructureError::format(NAME, format!("{what} {index} is not a string")));
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text).map(Some).map_err(StructureError::json(NAME))
}

/// `a.b` names are stored reversed; the block is `b_a`.
fn block_name(raw: &str) -> String {
    let name = raw.trim();
    match name.split_once('.') {
        Some((first, second)) => format!("{second}_{first}"),
        None => name.to_string(),
    }
}

fn point(
    data: &Map<String, Value>,
    chunk: u64,
    index: u64,
    resolver: &mut PaletteResolver<'_>,
) -> Result<(BlockPos, RuntimeId), StructureError> {
    let missing = |field: &str| StructureError::format(NAME, format!("point {index} of chunk {chunk} has no {field}"));
    let name = data.get("Name").and_then(Value::as_str).ok_or_else(|| missing("Name"))?;
    let mut coords = [0i32; 3];
    for (slot, field) in coords.iter_mut().zip(["X", "Y", "Z"]) {
        let value = data.get(field).ok_or_else(|| missing(field))?;
        *slot = json_int(value)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| StructureError::format(NAME, format!("point {index} of chunk {chunk} has a bad {field}")))?;
    }
    let name = block_name(name);
    let id = if name.is_empty() {
        resolver.registry().unknown()
    } else {
        resolver.resolve(&BlockDescriptor::legacy_named(name, 0))
    };
    Ok((BlockPos::new(coords[0], coords[1], coords[2]), id))
}

/// Parses a QingXu v1 file. Later points at a position replace earlier ones.
pub fn open(path: &Path, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
    let reader = ReadSession::new(path, Transport::Plain, NAME).open()?;
    let root: Map<String, Value> = serde_json::from_reader(reader).map_err(StructureError::json(NAME))?;
    let chunks = count(&root, TOTAL_BLOCKS)?.ok_or_else(|| StructureError::format(NAME, "missing totalBlocks"))?;

    let mut resolver = PaletteResolver::new(registry.as_ref());
    let mut builder = SparseBuilder::new();
    let mut points = 0usize;
    for i in 0..chunks {
        let Some(chunk) = embedded(&root, i, "chunk")? else { continue };
        let Some(total) = count(&chunk, TOTAL_POINTS)? else { continue };
        for j in 0..total {
            let Some(data) = embedded(&chunk, j, "point")? else { continue };
            let (pos, id) = point(&data, i, j, &mut resolver)?;
            builder.place(pos, id);
            points += 1;
        }
    }
    debug!(
        "QingXu v1: {} chunks, {} points, {} positions, {} unresolved",
        chunks,
        points,
        builder.len(),
        resolver.unknown_count()
    );
    builder.finish(Format::QingXuV1, registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Structure;
    use crate::testutil::test_registry;
    use serde_json::json;
    use std::path::PathBuf;
    use sunconvert_voxel::Size;

    fn chunk(points: &[Value]) -> String {
        let mut object = Map::new();
        object.insert(TOTAL_POINTS.to_string(), json!(points.len()));
        for (i, p) in points.iter().enumerate() {
            object.insert(i.to_string(), Value::String(p.to_string()));
        }
        Value::Object(object).to_string()
    }

    fn write_file(dir: &Path, root: &Value) -> PathBuf {
        let path = dir.join("test.json");
        std::fs::write(&path, root.to_string()).unwrap();
        path
    }

    #[test]
    fn test_nested_documents_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = json!({
            "totalBlocks": 3,
            "0": chunk(&[
                json!({"Name": "stone", "X": 5, "Y": 70, "Z": 5}),
                json!({"Name": "glass", "X": "6", "Y": "70", "Z": "5"}),
            ]),
            "1": "  ",
            "2": chunk(&[
                json!({"Name": "minecraft:dirt", "X": 5, "Y": 71, "Z": 6}),
                json!({"Name": "stone", "X": 5, "Y": 70, "Z": 5}),
                json!({"Name": "", "X": 6, "Y": 71, "Z": 6}),
            ]),
            "3": chunk(&[json!({"Name": "glass", "X": 100, "Y": 0, "Z": 0})]),
        });
        let path = write_file(dir.path(), &root);
        let registry = test_registry();
        let doc = open(&path, registry.clone()).unwrap();

        assert_eq!(doc.kind(), Format::QingXuV1);
        assert_eq!(doc.bounds().original_size(), Size::new(2, 2, 2));
        assert_eq!(doc.origin(), BlockPos::new(5, 70, 5));
        let ids: Vec<(BlockPos, u32)> = doc.records().iter().map(|r| (r.pos(), r.id)).collect();
        assert_eq!(
            ids,
            vec![
                (BlockPos::new(0, 0, 0), 1),
                (BlockPos::new(1, 0, 0), 5),
                (BlockPos::new(0, 1, 1), 2),
                (BlockPos::new(1, 1, 1), registry.unknown()),
            ]
        );
        assert_eq!(doc.count_non_air_blocks().unwrap(), 4);
    }

    #[test]
    fn test_dotted_names_are_reversed() {
        assert_eq!(block_name("block.command"), "command_block");
        assert_eq!(block_name(" stone "), "stone");

        let dir = tempfile::tempdir().unwrap();
        let root = json!({
            "totalBlocks": 1,
            "0": chunk(&[json!({"Name": "block.command", "X": 0, "Y": 0, "Z": 0})]),
        });
        let doc = open(&write_file(dir.path(), &root), test_registry()).unwrap();
        assert_eq!(doc.records()[0].id, 7);
    }

    #[test]
    fn test_chunk_without_point_count_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = json!({
            "totalBlocks": 2,
            "0": json!({"0": json!({"Name": "dirt", "X": 9, "Y": 9, "Z": 9}).to_string()}).to_string(),
            "1": chunk(&[json!({"Name": "stone", "X": 0, "Y": 0, "Z": 0})]),
        });
        let doc = open(&write_file(dir.path(), &root), test_registry()).unwrap();
        assert_eq!(doc.records().len(), 1);
        assert_eq!(doc.bounds().original_size(), Size::new(1, 1, 1));
    }

    #[test]
    fn test_invalid_documents() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry();

        let no_total = write_file(dir.path(), &json!({"0": chunk(&[])}));
        assert!(matches!(open(&no_total, registry.clone()), Err(StructureError::Format { format: "qingxu_v1", .. })));

        let no_blocks = write_file(dir.path(), &json!({"totalBlocks": 1, "0": chunk(&[])}));
        assert!(matches!(open(&no_blocks, registry.clone()), Err(StructureError::Format { .. })));

        let missing_y = write_file(
            dir.path(),
            &json!({"totalBlocks": 1, "0": chunk(&[json!({"Name": "stone", "X": 0, "Z": 0})])}),
        );
        assert!(matches!(open(&missing_y, registry.clone()), Err(StructureError::Format { .. })));

        let bad_chunk = write_file(dir.path(), &json!({"totalBlocks": 1, "0": "{not json"}));
        assert!(matches!(open(&bad_chunk, registry.clone()), Err(StructureError::Json { .. })));

        let not_string = write_file(dir.path(), &json!({"totalBlocks": 1, "0": {"totalPoints": 0}}));
        assert!(matches!(open(&not_string, registry), Err(StructureError::Format { .. })));
    }
}
