//! Block-entity helpers shared by the formats that carry loosely typed
//! metadata: JSON value coercions, JSON to tag conversion and the mapping from
//! block names to Bedrock block-entity ids.

use serde_json::Value;
use sunconvert_nbt::{NbtCompound, NbtList, NbtTag, TagType};

/// Reads an integer from a number or a decimal string. Floats truncate.
pub fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|u| u as i64)).or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truthiness of a loosely typed flag: booleans, non-zero numbers and the
/// strings `"true"` / `"1"`.
pub fn json_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => {
            let lower = s.trim().to_ascii_lowercase();
            lower == "true" || lower == "1"
        }
        _ => false,
    }
}

/// Text form of a value; strings are taken verbatim and a missing value is empty.
pub fn json_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Converts a JSON value into a tag. `null` has no tag form.
///
/// Integers become `Int` when they fit and `Long` otherwise. A list takes the
/// type of its first element and drops elements of any other type.
pub fn json_to_tag(value: &Value) -> Option<NbtTag> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(b) => NbtTag::Byte(*b as i8),
        Value::Number(n) => match n.as_i64() {
            Some(i) => match i32::try_from(i) {
                Ok(small) => NbtTag::Int(small),
                Err(_) => NbtTag::Long(i),
            },
            None => NbtTag::Double(n.as_f64()?),
        },
        Value::String(s) => NbtTag::String(s.clone()),
        Value::Array(items) => {
            let tags: Vec<NbtTag> = items.iter().filter_map(json_to_tag).collect();
            let elem = tags.first().map_or(TagType::End, TagType::of);
            let same: Vec<NbtTag> = tags.into_iter().filter(|t| TagType::of(t) == elem).collect();
            NbtTag::List(NbtList::from(same))
        }
        Value::Object(map) => {
            let mut compound = NbtCompound::new();
            for (key, value) in map {
                if let Some(tag) = json_to_tag(value) {
                    compound.insert(key.clone(), tag);
                }
            }
            NbtTag::Compound(compound)
        }
    })
}

/// Converts a tag into JSON. Bytes stay numeric.
pub fn tag_to_json(tag: &NbtTag) -> Value {
    match tag {
        NbtTag::Byte(v) => Value::from(*v),
        NbtTag::Short(v) => Value::from(*v),
        NbtTag::Int(v) => Value::from(*v),
        NbtTag::Long(v) => Value::from(*v),
        NbtTag::Float(v) => Value::from(*v),
        NbtTag::Double(v) => Value::from(*v),
        NbtTag::ByteArray(v) => Value::from(v.clone()),
        NbtTag::String(v) => Value::from(v.clone()),
        NbtTag::List(items) => Value::Array(items.iter().map(tag_to_json).collect()),
        NbtTag::Compound(c) => compound_to_json(c),
        NbtTag::IntArray(v) => Value::from(v.clone()),
        NbtTag::LongArray(v) => Value::from(v.clone()),
    }
}

pub fn compound_to_json(compound: &NbtCompound) -> Value {
    Value::Object(compound.inner().iter().map(|(k, v)| (k.clone(), tag_to_json(v))).collect())
}

/// Bedrock block-entity id for a block or entity name, ignoring namespace
/// and case.
pub fn block_entity_id(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let short = lower.strip_prefix("minecraft:").unwrap_or(&lower);
    Some(match short {
        "command_block" | "repeating_command_block" | "chain_command_block" => "CommandBlock",
        "chest" | "trapped_chest" => "Chest",
        "barrel" => "Barrel",
        "hopper" => "Hopper",
        "dispenser" => "Dispenser",
        "dropper" => "Dropper",
        "blast_furnace" | "lit_blast_furnace" => "BlastFurnace",
        "furnace" | "lit_furnace" => "Furnace",
        "smoker" | "lit_smoker" => "Smoker",
        "crafter" => "Crafter",
        s if s.contains("shulker_box") => "ShulkerBox",
        _ => return None,
    })
}

/// Prefixes `minecraft:` onto names without a namespace.
pub fn namespaced(name: &str) -> String {
    if name.is_empty() || name.contains(':') {
        name.to_string()
    } else {
        format!("minecraft:{name}")
    }
}

/// Whether a command uses the post-1.19.50 `execute` subcommand syntax.
///
/// Matches an optional slash, `execute`, optional spaces and one of the
/// new-style subcommand keywords, anywhere in the text.
pub fn uses_new_execute_syntax(command: &str) -> bool {
    const SUBCOMMANDS: [&str; 11] = [
        "as", "at", "align", "anchored", "facing", "in", "positioned", "rotated", "if", "unless", "run",
    ];
    command.match_indices("execute").any(|(at, word)| {
        let rest = command[at + word.len()..].trim_start_matches(' ');
        SUBCOMMANDS.iter().any(|sub| rest.starts_with(sub))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sunconvert_nbt::{CompoundExt, TagExt};

    #[test]
    fn test_json_int_coercions() {
        assert_eq!(json_int(&json!(5)), Some(5));
        assert_eq!(json_int(&json!(2.9)), Some(2));
        assert_eq!(json_int(&json!(" 12 ")), Some(12));
        assert_eq!(json_int(&json!("stone")), None);
        assert_eq!(json_int(&json!(true)), None);
    }

    #[test]
    fn test_json_bool_coercions() {
        assert!(json_bool(Some(&json!(true))));
        assert!(json_bool(Some(&json!(1))));
        assert!(json_bool(Some(&json!("TRUE"))));
        assert!(!json_bool(Some(&json!("0"))));
        assert!(!json_bool(None));
    }

    #[test]
    fn test_json_to_tag_shapes() {
        let tag = json_to_tag(&json!({"a": 1, "b": [1, "x", 2], "c": null, "d": 1.5, "e": 5000000000i64})).unwrap();
        let compound = tag.as_compound().unwrap();
        assert_eq!(compound.get_tag("a"), Some(&NbtTag::Int(1)));
        let list = NbtList::from(vec![NbtTag::Int(1), NbtTag::Int(2)]);
        assert_eq!(compound.get_tag("b"), Some(&NbtTag::List(list)));
        assert!(!compound.contains_key("c"));
        assert_eq!(compound.get_tag("d"), Some(&NbtTag::Double(1.5)));
        assert_eq!(compound.get_tag("e"), Some(&NbtTag::Long(5_000_000_000)));
    }

    #[test]
    fn test_block_entity_ids() {
        assert_eq!(block_entity_id("minecraft:trapped_chest"), Some("Chest"));
        assert_eq!(block_entity_id("Repeating_Command_Block"), Some("CommandBlock"));
        assert_eq!(block_entity_id("red_shulker_box"), Some("ShulkerBox"));
        assert_eq!(block_entity_id("lit_smoker"), Some("Smoker"));
        assert_eq!(block_entity_id("stone"), None);
    }

    #[test]
    fn test_execute_syntax_detection() {
        assert!(uses_new_execute_syntax("/execute as @a run say hi"));
        assert!(uses_new_execute_syntax("execute    positioned ~ ~ ~ run tp @s"));
        assert!(!uses_new_execute_syntax("execute @a ~ ~ ~ say hi"));
        assert!(!uses_new_execute_syntax("say hello"));
    }
}
