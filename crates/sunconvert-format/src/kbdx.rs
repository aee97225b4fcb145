//! KBDX: a little-endian block record table followed by a JSON trailer
//! holding the name palette and block-entity objects. Read-only.

use std::io::Read;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use sunconvert_nbt::{NbtCompound, NbtList, NbtTag};
use sunconvert_voxel::{BlockDescriptor, BlockPos, BlockRegistry, PaletteResolver};
use tracing::debug;

use crate::Format;
use crate::entity::{block_entity_id, json_bool, json_int, json_text, json_to_tag, namespaced, uses_new_execute_syntax};
use crate::error::{ReadContext, StructureError};
use crate::source::{ReadSession, Transport};
use crate::sparse::{SparseBuilder, SparseStructure};
use crate::structure::SharedRegistry;

const NAME: &str = "kbdx";
const ENTITY_KEY: &str = "BlockEntityData";

#[derive(Clone, Copy, Debug)]
struct RawBlock {
    pos: BlockPos,
    index: u32,
    aux: u32,
}

fn read_record(reader: &mut impl Read) -> Result<RawBlock, StructureError> {
    let x = reader.read_i32::<LittleEndian>().context("block record")?;
    let y = reader.read_i32::<LittleEndian>().context("block record")?;
    let z = reader.read_i32::<LittleEndian>().context("block record")?;
    let index = reader.read_u32::<LittleEndian>().context("block record")?;
    let aux = reader.read_u32::<LittleEndian>().context("block record")?;
    Ok(RawBlock {
        pos: BlockPos::new(x, y, z),
        index,
        aux,
    })
}

/// Parses a KBDX file into a position-indexed document.
pub fn open(path: &Path, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
    let mut reader = ReadSession::new(path, Transport::Plain, NAME).open()?;
    let count = reader.read_u32::<LittleEndian>().context("block count")?;
    if count == 0 {
        return Err(StructureError::format(NAME, "no block records"));
    }
    let mut raw = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        raw.push(read_record(&mut reader)?);
    }

    let mut trailer = String::new();
    reader.read_to_string(&mut trailer).context("metadata")?;
    if trailer.trim().is_empty() {
        return Err(StructureError::format(NAME, "missing metadata JSON"));
    }
    let mut metadata: Map<String, Value> = serde_json::from_str(&trailer).map_err(StructureError::json(NAME))?;

    let entities = metadata.remove(ENTITY_KEY).map(|v| entity_records(&v)).unwrap_or_default();
    let palette: FxHashMap<i64, &str> = metadata
        .iter()
        .filter_map(|(name, value)| json_int(value).map(|index| (index, name.as_str())))
        .collect();
    if palette.is_empty() {
        return Err(StructureError::format(NAME, "metadata holds no palette entries"));
    }

    let mut resolver = PaletteResolver::new(registry.as_ref());
    let mut builder = SparseBuilder::new();
    for block in &raw {
        let name = palette.get(&i64::from(block.index)).map_or("", |n| n.trim());
        let id = if name.is_empty() {
            registry.unknown()
        } else {
            resolver.resolve(&BlockDescriptor::legacy_named(name, block.aux as u16))
        };
        builder.place(block.pos, id);
        if let Some(record) = entities.get(&block.pos) {
            builder.set_metadata_if_absent(block.pos, record.clone());
        }
    }
    debug!(
        "KBDX: {} records, {} palette names, {} block entities, {} unresolved",
        raw.len(),
        palette.len(),
        entities.len(),
        resolver.unknown_count()
    );
    builder.finish(Format::Kbdx, registry)
}

/// Converts the `BlockEntityData` array into tag records keyed by position.
/// The first object at a position wins.
fn entity_records(value: &Value) -> FxHashMap<BlockPos, NbtCompound> {
    let mut out = FxHashMap::default();
    let Value::Array(entries) = value else {
        return out;
    };
    for entry in entries {
        let Value::Object(data) = entry else { continue };
        let coords = ["x", "y", "z"].map(|k| data.get(k).and_then(json_int));
        let [Some(x), Some(y), Some(z)] = coords else { continue };
        let pos = BlockPos::new(x as i32, y as i32, z as i32);
        if out.contains_key(&pos) {
            continue;
        }
        let record = command_block_record(data)
            .or_else(|| sign_record(data))
            .or_else(|| container_record(data))
            .unwrap_or_else(|| copied_record(data));
        out.insert(pos, record);
    }
    out
}

fn command_block_record(data: &Map<String, Value>) -> Option<NbtCompound> {
    let id = data.get("id").and_then(Value::as_str)?;
    if !id.ends_with("command_block") {
        return None;
    }
    let command = json_text(data.get("Command"));
    let version = if uses_new_execute_syntax(&command) { 38 } else { 19 };
    let int = |key: &str| data.get(key).and_then(json_int).unwrap_or(0) as i32;

    let mut nbt = NbtCompound::new();
    nbt.insert("id", "CommandBlock");
    nbt.insert("CustomName", json_text(data.get("CustomName")));
    nbt.insert("ExecuteOnFirstTick", json_bool(data.get("ExecuteOnFirstTick")));
    nbt.insert("TrackOutput", json_bool(data.get("TrackOutput")));
    nbt.insert("conditionalMode", json_bool(data.get("isConditional")));
    nbt.insert("auto", !json_bool(data.get("redstone")));
    nbt.insert("TickDelay", int("TickDelay"));
    nbt.insert("Powered", NbtTag::Byte(0));
    nbt.insert("LPCommandMode", int("Mode"));
    nbt.insert("LastOutput", json_text(data.get("LastOutput")));
    nbt.insert("Version", NbtTag::Int(version));
    nbt.insert("Command", command);
    Some(nbt)
}

fn sign_record(data: &Map<String, Value>) -> Option<NbtCompound> {
    if !json_text(data.get("id")).to_lowercase().contains("sign") {
        return None;
    }
    let text = match data.get("Text") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|line| json_text(Some(line)))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => data
            .get("FrontText")
            .and_then(|front| front.get("Text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let mut nbt = NbtCompound::new();
    nbt.insert("id", "Sign");
    if !text.is_empty() {
        nbt.insert("Text", text);
    }
    if let Some(color) = data.get("Color").and_then(Value::as_str).filter(|c| !c.is_empty()) {
        nbt.insert("Color", color);
    }
    if let Some(glowing) = data.get("GlowingText").and_then(Value::as_bool) {
        nbt.insert("GlowingText", glowing);
    }
    Some(nbt)
}

/// First of `keys` present with a non-null value.
fn first_present<'v>(item: &'v Map<String, Value>, keys: [&str; 2]) -> Option<&'v Value> {
    keys.iter().find_map(|k| item.get(*k).filter(|v| !v.is_null()))
}

fn container_record(data: &Map<String, Value>) -> Option<NbtCompound> {
    let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
    let items = data.get("Items").and_then(Value::as_array);
    if id.is_empty() && items.is_none() {
        return None;
    }

    let mut nbt = NbtCompound::new();
    if let Some(mapped) = block_entity_id(id) {
        nbt.insert("id", mapped);
    } else if !id.is_empty() {
        nbt.insert("id", id);
    }

    let slots: Vec<NbtTag> = items
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .map(|item| {
            let int = |keys| first_present(item, keys).and_then(json_int).unwrap_or(0);
            let mut slot = NbtCompound::new();
            slot.insert("Name", namespaced(&json_text(first_present(item, ["Name", "name"]))));
            slot.insert("Damage", int(["Damage", "damage"]) as i16);
            slot.insert("Count", NbtTag::Byte(int(["Count", "count"]) as u8 as i8));
            slot.insert("Slot", NbtTag::Byte(int(["Slot", "slot"]) as u8 as i8));
            NbtTag::Compound(slot)
        })
        .collect();
    if !slots.is_empty() {
        nbt.insert("Items", NbtTag::List(NbtList::from(slots)));
    }
    for key in ["CustomName", "Lock"] {
        if let Some(text) = data.get(key).and_then(Value::as_str).filter(|t| !t.is_empty()) {
            nbt.insert(key, text);
        }
    }
    (!nbt.inner().is_empty()).then_some(nbt)
}

fn copied_record(data: &Map<String, Value>) -> NbtCompound {
    let mut nbt = NbtCompound::new();
    for (key, value) in data.iter().filter(|(k, _)| !matches!(k.as_str(), "x" | "y" | "z")) {
        if let Some(tag) = json_to_tag(value) {
            nbt.insert(key.clone(), tag);
        }
    }
    if let Some(mapped) = data.get("id").and_then(Value::as_str).and_then(block_entity_id) {
        nbt.insert("id", mapped);
    }
    nbt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Structure;
    use crate::testutil::test_registry;
    use byteorder::WriteBytesExt;
    use sunconvert_nbt::{CompoundExt, TagExt};
    use serde_json::json;
    use std::path::PathBuf;
    use sunconvert_voxel::{ChunkPos, Size};

    fn write_kbdx(dir: &Path, records: &[(i32, i32, i32, u32, u32)], trailer: &Value) -> PathBuf {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(records.len() as u32).unwrap();
        for &(x, y, z, index, aux) in records {
            for v in [x, y, z] {
                bytes.write_i32::<LittleEndian>(v).unwrap();
            }
            bytes.write_u32::<LittleEndian>(index).unwrap();
            bytes.write_u32::<LittleEndian>(aux).unwrap();
        }
        bytes.extend_from_slice(trailer.to_string().as_bytes());
        let path = dir.join("test.kbdx");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_cube_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let trailer = json!({"stone": 0, "minecraft:wool": 1, "air": "2"});
        let records = [
            (100, 64, 100, 0, 0),
            (101, 64, 100, 1, 14),
            (100, 65, 101, 2, 0),
            (101, 65, 101, 1, 0),
        ];
        let path = write_kbdx(dir.path(), &records, &trailer);
        let registry = test_registry();
        let doc = open(&path, registry.clone()).unwrap();

        assert_eq!(doc.kind(), Format::Kbdx);
        assert_eq!(doc.bounds().original_size(), Size::new(2, 2, 2));
        assert_eq!(doc.origin(), BlockPos::new(100, 64, 100));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 3);

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0)]).unwrap();
        let chunk = &chunks[&ChunkPos::new(0, 0)];
        assert_eq!(chunk.block(0, -64, 0, 0), registry.lookup_name("minecraft:stone").unwrap());
        assert_eq!(chunk.block(1, -64, 0, 0), 4);
        assert_eq!(chunk.block(1, -63, 1, 0), 3);
    }

    #[test]
    fn test_missing_palette_name_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_kbdx(dir.path(), &[(0, 0, 0, 7, 0), (1, 0, 0, 0, 0)], &json!({"glass": 0}));
        let registry = test_registry();
        let doc = open(&path, registry.clone()).unwrap();
        let records = doc.records();
        assert_eq!(records[0].id, registry.unknown());
        assert_eq!(records[1].id, registry.lookup_name("minecraft:glass").unwrap());
    }

    #[test]
    fn test_block_entities_converted() {
        let dir = tempfile::tempdir().unwrap();
        let trailer = json!({
            "command_block": 0,
            "chest": 1,
            "BlockEntityData": [
                {"x": 0, "y": 0, "z": 0, "id": "minecraft:command_block", "Command": "/execute as @a run say hi",
                 "redstone": true, "isConditional": "1", "TickDelay": 5, "Mode": 2},
                {"x": 0, "y": 0, "z": 0, "id": "chest"},
                {"x": 1, "y": 0, "z": 0, "id": "chest", "Items": [{"name": "apple", "count": 3, "slot": 4}], "Lock": ""},
                {"x": 2, "y": 0, "z": 0, "id": "oak_sign", "Text": ["a", "b"], "GlowingText": true},
                {"x": 3, "y": 0, "z": 0, "note": "keep"}
            ]
        });
        let records = [(0, 0, 0, 0, 0), (1, 0, 0, 1, 2), (2, 0, 0, 1, 2), (3, 0, 0, 1, 2)];
        let path = write_kbdx(dir.path(), &records, &trailer);
        let doc = open(&path, test_registry()).unwrap();
        let meta = doc.metadata();

        let command = &meta[&BlockPos::new(0, 0, 0)];
        assert_eq!(command.get_str("id"), Some("CommandBlock"));
        assert_eq!(command.get_i32("Version"), Some(38));
        assert_eq!(command.get_tag("auto"), Some(&NbtTag::Byte(0)));
        assert_eq!(command.get_tag("conditionalMode"), Some(&NbtTag::Byte(1)));
        assert_eq!(command.get_i32("TickDelay"), Some(5));
        assert_eq!(command.get_i32("LPCommandMode"), Some(2));

        let chest = &meta[&BlockPos::new(1, 0, 0)];
        assert_eq!(chest.get_str("id"), Some("Chest"));
        assert!(!chest.contains_key("Lock"));
        let item = chest.get_list("Items").unwrap()[0].as_compound().unwrap();
        assert_eq!(item.get_str("Name"), Some("minecraft:apple"));
        assert_eq!(item.get_tag("Count"), Some(&NbtTag::Byte(3)));
        assert_eq!(item.get_tag("Slot"), Some(&NbtTag::Byte(4)));
        assert_eq!(item.get_tag("Damage"), Some(&NbtTag::Short(0)));

        let sign = &meta[&BlockPos::new(2, 0, 0)];
        assert_eq!(sign.get_str("id"), Some("Sign"));
        assert_eq!(sign.get_str("Text"), Some("a\nb"));
        assert_eq!(sign.get_tag("GlowingText"), Some(&NbtTag::Byte(1)));

        let copied = &meta[&BlockPos::new(3, 0, 0)];
        assert_eq!(copied.get_str("note"), Some("keep"));
        assert!(!copied.contains_key("x"));
    }

    #[test]
    fn test_zero_count_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_kbdx(dir.path(), &[], &json!({"stone": 0}));
        assert!(matches!(open(&path, test_registry()), Err(StructureError::Format { format: "kbdx", .. })));
    }

    #[test]
    fn test_truncated_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.kbdx");
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(2).unwrap();
        bytes.write_i32::<LittleEndian>(0).unwrap();
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            open(&path, test_registry()),
            Err(StructureError::TruncatedStream { field: "block record" })
        ));
    }

    #[test]
    fn test_bad_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_kbdx(dir.path(), &[(0, 0, 0, 0, 0)], &json!({"BlockEntityData": []}));
        assert!(matches!(open(&path, test_registry()), Err(StructureError::Format { .. })));

        let path = dir.path().join("garbage.kbdx");
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&[0; 20]);
        bytes.extend_from_slice(b"{not json");
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(open(&path, test_registry()), Err(StructureError::Json { .. })));
    }
}
