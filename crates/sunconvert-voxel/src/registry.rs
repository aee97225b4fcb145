//! Block identity: runtime ids, block descriptors, and the registry seam.
//!
//! Structure files name blocks in several ways (namespaced name plus
//! properties, legacy numeric id plus data value, legacy name plus aux value).
//! A [`BlockRegistry`] turns those into opaque [`RuntimeId`]s. It is injected
//! into every format reader rather than looked up globally, so tests can supply
//! a fixed table.
//!
//! [`PaletteResolver`] memoizes resolutions per document and applies the
//! three-tier fallback; [`PaletteBuilder`] assigns palette indices in the write
//! direction.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque block identifier produced by a [`BlockRegistry`].
pub type RuntimeId = u32;

/// Namespace assumed for block names written without one.
pub const DEFAULT_NAMESPACE: &str = "minecraft:";

/// A single block property value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i32),
    String(String),
}

impl StateValue {
    /// Parses an unquoted textual value: `true`/`false`, integers, else a string.
    pub fn parse_loose(text: &str) -> Self {
        match text {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => text
                .parse::<i32>()
                .map(Self::Int)
                .unwrap_or_else(|_| Self::String(text.to_string())),
        }
    }

    /// Compares by textual form, so `Bool(true)` matches `String("true")`.
    pub fn loosely_eq(&self, other: &StateValue) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// Block properties in canonical (sorted) order.
pub type BlockProperties = BTreeMap<String, StateValue>;

/// Name and properties of one block state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub name: String,
    #[serde(default)]
    pub properties: BlockProperties,
}

impl BlockState {
    pub fn new(name: impl Into<String>, properties: BlockProperties) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Name without the default namespace.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(DEFAULT_NAMESPACE)
            .unwrap_or(&self.name)
    }

    /// Bedrock state string: `["key"=value,...]`, strings quoted, keys sorted.
    pub fn state_string(&self) -> String {
        format_state_string(&self.properties)
    }
}

/// Formats properties as `["key"=value,...]`.
pub fn format_state_string(properties: &BlockProperties) -> String {
    let mut out = String::from("[");
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(key);
        out.push_str("\"=");
        match value {
            StateValue::String(s) => {
                out.push('"');
                out.push_str(s);
                out.push('"');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out.push(']');
    out
}

/// Parses `[k=v,...]` or `["k"="v",...]`; returns `None` for malformed input.
///
/// Brackets are optional; an empty body yields empty properties. Commas inside
/// double quotes do not split entries.
pub fn parse_state_string(text: &str) -> Option<BlockProperties> {
    let text = text.trim();
    let body = text
        .strip_prefix('[')
        .map(|rest| rest.strip_suffix(']'))
        .unwrap_or(Some(text))?;
    let mut properties = BlockProperties::new();
    for part in split_unquoted(body, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').or_else(|| part.split_once(':'))?;
        let key = key.trim().trim_matches('"');
        if key.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            StateValue::String(value[1..value.len() - 1].to_string())
        } else {
            StateValue::parse_loose(value)
        };
        properties.insert(key.to_string(), value);
    }
    Some(properties)
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Identifier half of a legacy block reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LegacyId {
    /// Pre-flattening numeric id (MCEdit schematics).
    Numeric(u16),
    /// Block name paired with a legacy aux value.
    Named(String),
}

/// Legacy block reference: id plus data/aux value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyBlock {
    pub id: LegacyId,
    pub data: u16,
}

/// Everything a format knows about one palette entry.
///
/// Used as the memo key, so two descriptors that differ only in property
/// order still hit the same cache slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockDescriptor {
    pub name: Option<String>,
    pub properties: BlockProperties,
    pub legacy: Option<LegacyBlock>,
}

impl BlockDescriptor {
    /// A bare block name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A block name with properties.
    pub fn with_properties(name: impl Into<String>, properties: BlockProperties) -> Self {
        Self {
            name: Some(name.into()),
            properties,
            legacy: None,
        }
    }

    /// A numeric legacy id and data value.
    pub fn legacy_numeric(id: u16, data: u16) -> Self {
        Self {
            legacy: Some(LegacyBlock {
                id: LegacyId::Numeric(id),
                data,
            }),
            ..Self::default()
        }
    }

    /// A block name with a legacy aux value; the name doubles as the bare-name fallback.
    pub fn legacy_named(name: impl Into<String>, aux: u16) -> Self {
        let name = name.into();
        Self {
            legacy: Some(LegacyBlock {
                id: LegacyId::Named(name.clone()),
                data: aux,
            }),
            name: Some(name),
            properties: BlockProperties::new(),
        }
    }
}

/// Returns `name` and, when it has no namespace, the namespaced variant.
fn name_candidates(name: &str) -> impl Iterator<Item = Cow<'_, str>> {
    let prefixed = (!name.contains(':')).then(|| Cow::Owned(format!("{DEFAULT_NAMESPACE}{name}")));
    std::iter::once(Cow::Borrowed(name)).chain(prefixed)
}

// ---------------------------------------------------------------------------
// Registry seam
// ---------------------------------------------------------------------------

/// Read-only block registry collaborator.
pub trait BlockRegistry {
    /// Runtime id of air.
    fn air(&self) -> RuntimeId;

    /// Sentinel id substituted for untranslatable blocks.
    fn unknown(&self) -> RuntimeId;

    /// Exact name + properties match.
    fn lookup_state(&self, name: &str, properties: &BlockProperties) -> Option<RuntimeId>;

    /// Legacy id + data match.
    fn lookup_legacy(&self, legacy: &LegacyBlock) -> Option<RuntimeId>;

    /// Default state of a block name.
    fn lookup_name(&self, name: &str) -> Option<RuntimeId>;

    /// Name and properties of a runtime id.
    fn state_of(&self, id: RuntimeId) -> Option<&BlockState>;

    /// Legacy numeric id and data of a runtime id, when one exists.
    fn legacy_of(&self, _id: RuntimeId) -> Option<(u16, u16)> {
        None
    }

    /// Entry `index` of a numbered runtime-id pool.
    fn runtime_pool_entry(&self, _pool: u8, _index: u32) -> Option<RuntimeId> {
        None
    }

    /// Returns `true` if `id` is air.
    fn is_air(&self, id: RuntimeId) -> bool {
        id == self.air()
    }
}

// ---------------------------------------------------------------------------
// Read direction
// ---------------------------------------------------------------------------

/// Memoizing descriptor → runtime id resolver for one document.
pub struct PaletteResolver<'r> {
    registry: &'r dyn BlockRegistry,
    cache: FxHashMap<BlockDescriptor, RuntimeId>,
    unknown_hits: usize,
}

impl<'r> PaletteResolver<'r> {
    pub fn new(registry: &'r dyn BlockRegistry) -> Self {
        Self {
            registry,
            cache: FxHashMap::default(),
            unknown_hits: 0,
        }
    }

    pub fn registry(&self) -> &'r dyn BlockRegistry {
        self.registry
    }

    /// Resolves a descriptor, falling back to the unknown id.
    ///
    /// Tiers: exact name + properties, then legacy id + data, then the bare
    /// name. Names without a namespace are also tried with `minecraft:`.
    pub fn resolve(&mut self, descriptor: &BlockDescriptor) -> RuntimeId {
        if let Some(&id) = self.cache.get(descriptor) {
            return id;
        }
        let id = match Self::lookup(self.registry, descriptor) {
            Some(id) => id,
            None => {
                self.unknown_hits += 1;
                self.registry.unknown()
            }
        };
        self.cache.insert(descriptor.clone(), id);
        id
    }

    fn lookup(registry: &dyn BlockRegistry, descriptor: &BlockDescriptor) -> Option<RuntimeId> {
        if let Some(name) = &descriptor.name {
            for candidate in name_candidates(name) {
                if let Some(id) = registry.lookup_state(&candidate, &descriptor.properties) {
                    return Some(id);
                }
            }
        }
        if let Some(legacy) = &descriptor.legacy {
            if let Some(id) = registry.lookup_legacy(legacy) {
                return Some(id);
            }
            if let LegacyId::Named(name) = &legacy.id {
                for candidate in name_candidates(name).skip(1) {
                    let prefixed = LegacyBlock {
                        id: LegacyId::Named(candidate.into_owned()),
                        data: legacy.data,
                    };
                    if let Some(id) = registry.lookup_legacy(&prefixed) {
                        return Some(id);
                    }
                }
            }
        }
        if let Some(name) = &descriptor.name {
            for candidate in name_candidates(name) {
                if let Some(id) = registry.lookup_name(&candidate) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Number of distinct descriptors that fell back to the unknown id.
    pub fn unknown_count(&self) -> usize {
        self.unknown_hits
    }

    /// Number of distinct descriptors resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

// ---------------------------------------------------------------------------
// Write direction
// ---------------------------------------------------------------------------

/// First-seen palette index allocation for encoders.
#[derive(Clone, Debug, Default)]
pub struct PaletteBuilder {
    index_of: FxHashMap<RuntimeId, u32>,
    entries: Vec<RuntimeId>,
}

impl PaletteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A palette whose index 0 is `air`.
    pub fn with_air(air: RuntimeId) -> Self {
        let mut builder = Self::new();
        builder.intern(air);
        builder
    }

    /// Returns the index of `id`, allocating the next one if unseen.
    pub fn intern(&mut self, id: RuntimeId) -> (u32, bool) {
        if let Some(&index) = self.index_of.get(&id) {
            return (index, false);
        }
        let index = self.entries.len() as u32;
        self.index_of.insert(id, index);
        self.entries.push(id);
        (index, true)
    }

    pub fn index_of(&self, id: RuntimeId) -> Option<u32> {
        self.index_of.get(&id).copied()
    }

    /// Runtime ids in index order.
    pub fn entries(&self) -> &[RuntimeId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Table-backed registry
// ---------------------------------------------------------------------------

/// Errors that can occur while building a [`BlockTable`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The same name + properties appears twice.
    #[error("duplicate block state: {0}")]
    DuplicateState(String),
    /// More entries than a `u32` runtime id can address.
    #[error("block table is full")]
    RegistryFull,
    /// The table file could not be read.
    #[error("failed to read block table: {0}")]
    Read(#[source] std::io::Error),
    /// The table file is not valid JSON.
    #[error("failed to parse block table: {0}")]
    Parse(#[source] serde_json::Error),
}

/// One row of a block table file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockTableEntry {
    pub name: String,
    #[serde(default)]
    pub states: BlockProperties,
    #[serde(default)]
    pub legacy_id: Option<u16>,
    #[serde(default)]
    pub legacy_data: Option<u16>,
}

impl BlockTableEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: BlockProperties::new(),
            legacy_id: None,
            legacy_data: None,
        }
    }

    pub fn states(mut self, states: BlockProperties) -> Self {
        self.states = states;
        self
    }

    pub fn legacy(mut self, id: Option<u16>, data: u16) -> Self {
        self.legacy_id = id;
        self.legacy_data = Some(data);
        self
    }
}

/// One entry of a runtime-id pool, resolved against the table by legacy name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub name: String,
    #[serde(default)]
    pub data: u16,
}

#[derive(Debug, Deserialize)]
struct BlockTableFile {
    blocks: Vec<BlockTableEntry>,
    #[serde(default)]
    pools: BTreeMap<u8, Vec<PoolEntry>>,
}

/// [`BlockRegistry`] backed by an explicit list of block states.
///
/// Runtime ids are table indices. `minecraft:air` is always id 0 and a
/// `minecraft:unknown` sentinel is appended when the table lacks one.
pub struct BlockTable {
    states: Vec<BlockState>,
    legacy: Vec<Option<(u16, u16)>>,
    by_name: FxHashMap<String, Vec<RuntimeId>>,
    by_numeric: FxHashMap<(u16, u16), RuntimeId>,
    by_named_legacy: FxHashMap<(String, u16), RuntimeId>,
    pools: FxHashMap<u8, Vec<RuntimeId>>,
    unknown: RuntimeId,
}

impl BlockTable {
    /// Name of the air block.
    pub const AIR: &'static str = "minecraft:air";
    /// Name of the unknown-block sentinel.
    pub const UNKNOWN: &'static str = "minecraft:unknown";

    /// Builds a table from its rows.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateState`] if two rows share a name and
    /// properties.
    pub fn new(entries: Vec<BlockTableEntry>) -> Result<Self, RegistryError> {
        let mut table = Self {
            states: Vec::with_capacity(entries.len() + 2),
            legacy: Vec::with_capacity(entries.len() + 2),
            by_name: FxHashMap::default(),
            by_numeric: FxHashMap::default(),
            by_named_legacy: FxHashMap::default(),
            pools: FxHashMap::default(),
            unknown: 0,
        };
        let air_row = entries
            .iter()
            .position(|e| e.name == Self::AIR && e.states.is_empty());
        let mut rows = entries;
        let air = match air_row {
            Some(i) => rows.remove(i),
            None => BlockTableEntry::new(Self::AIR).legacy(Some(0), 0),
        };
        table.push(air)?;
        for row in rows {
            table.push(row)?;
        }
        table.unknown = match table.by_name.get(Self::UNKNOWN).and_then(|ids| ids.first()) {
            Some(&id) => id,
            None => table.push(BlockTableEntry::new(Self::UNKNOWN))?,
        };
        Ok(table)
    }

    fn push(&mut self, entry: BlockTableEntry) -> Result<RuntimeId, RegistryError> {
        let id = RuntimeId::try_from(self.states.len()).map_err(|_| RegistryError::RegistryFull)?;
        if self.lookup_state(&entry.name, &entry.states).is_some() {
            return Err(RegistryError::DuplicateState(
                BlockState::new(entry.name, entry.states).state_string(),
            ));
        }
        let legacy = match (entry.legacy_id, entry.legacy_data) {
            (Some(numeric), data) => {
                let data = data.unwrap_or(0);
                self.by_numeric.entry((numeric, data)).or_insert(id);
                Some((numeric, data))
            }
            _ => None,
        };
        if let Some(data) = entry.legacy_data {
            self.by_named_legacy
                .entry((entry.name.clone(), data))
                .or_insert(id);
        }
        self.by_name.entry(entry.name.clone()).or_default().push(id);
        self.states.push(BlockState::new(entry.name, entry.states));
        self.legacy.push(legacy);
        Ok(id)
    }

    /// Parses a table from JSON: `{"blocks": [...], "pools": {...}}`.
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let file: BlockTableFile = serde_json::from_str(json).map_err(RegistryError::Parse)?;
        let mut table = Self::new(file.blocks)?;
        for (pool, entries) in file.pools {
            table = table.with_pool(pool, &entries);
        }
        Ok(table)
    }

    /// Reads and parses a JSON table file.
    pub fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(RegistryError::Read)?;
        let table = Self::from_json_str(&contents)?;
        tracing::info!(
            "Loaded block table with {} states from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Registers a runtime-id pool; entries that do not resolve map to unknown.
    pub fn with_pool(mut self, pool: u8, entries: &[PoolEntry]) -> Self {
        let ids = entries
            .iter()
            .map(|e| {
                let legacy = LegacyBlock {
                    id: LegacyId::Named(e.name.clone()),
                    data: e.data,
                };
                self.lookup_legacy(&legacy)
                    .or_else(|| self.lookup_name(&e.name))
                    .unwrap_or(self.unknown)
            })
            .collect();
        self.pools.insert(pool, ids);
        self
    }

    /// Number of states, including air and the unknown sentinel.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if only air and the unknown sentinel are present.
    pub fn is_empty(&self) -> bool {
        self.states.len() <= 2
    }
}

impl BlockRegistry for BlockTable {
    fn air(&self) -> RuntimeId {
        0
    }

    fn unknown(&self) -> RuntimeId {
        self.unknown
    }

    fn lookup_state(&self, name: &str, properties: &BlockProperties) -> Option<RuntimeId> {
        self.by_name.get(name)?.iter().copied().find(|&id| {
            let candidate = &self.states[id as usize].properties;
            candidate.len() == properties.len()
                && candidate
                    .iter()
                    .all(|(k, v)| properties.get(k).is_some_and(|p| p.loosely_eq(v)))
        })
    }

    fn lookup_legacy(&self, legacy: &LegacyBlock) -> Option<RuntimeId> {
        match &legacy.id {
            LegacyId::Numeric(id) => self.by_numeric.get(&(*id, legacy.data)).copied(),
            LegacyId::Named(name) => self
                .by_named_legacy
                .get(&(name.clone(), legacy.data))
                .copied()
                .or_else(|| {
                    (legacy.data == 0)
                        .then(|| self.lookup_name(name))
                        .flatten()
                }),
        }
    }

    fn lookup_name(&self, name: &str) -> Option<RuntimeId> {
        self.by_name.get(name)?.first().copied()
    }

    fn state_of(&self, id: RuntimeId) -> Option<&BlockState> {
        self.states.get(id as usize)
    }

    fn legacy_of(&self, id: RuntimeId) -> Option<(u16, u16)> {
        self.legacy.get(id as usize).copied().flatten()
    }

    fn runtime_pool_entry(&self, pool: u8, index: u32) -> Option<RuntimeId> {
        self.pools.get(&pool)?.get(index as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, StateValue)]) -> BlockProperties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn test_table() -> BlockTable {
        BlockTable::new(vec![
            BlockTableEntry::new("minecraft:stone").legacy(Some(1), 0),
            BlockTableEntry::new("minecraft:stone")
                .states(props(&[("stone_type", StateValue::String("granite".into()))]))
                .legacy(Some(1), 1),
            BlockTableEntry::new("minecraft:wool")
                .states(props(&[("color", StateValue::String("white".into()))]))
                .legacy(Some(35), 0),
            BlockTableEntry::new("minecraft:wool")
                .states(props(&[("color", StateValue::String("red".into()))]))
                .legacy(Some(35), 14),
        ])
        .unwrap()
    }

    #[test]
    fn test_air_is_id_zero() {
        let table = test_table();
        assert_eq!(table.air(), 0);
        assert_eq!(table.state_of(0).unwrap().name, BlockTable::AIR);
        assert!(table.is_air(0));
    }

    #[test]
    fn test_unknown_sentinel_appended() {
        let table = test_table();
        assert_eq!(table.unknown() as usize, table.len() - 1);
        assert_eq!(table.state_of(table.unknown()).unwrap().name, BlockTable::UNKNOWN);
    }

    #[test]
    fn test_exact_state_match() {
        let table = test_table();
        let mut resolver = PaletteResolver::new(&table);
        let red = BlockDescriptor::with_properties(
            "minecraft:wool",
            props(&[("color", StateValue::String("red".into()))]),
        );
        assert_eq!(resolver.resolve(&red), 4);
    }

    #[test]
    fn test_legacy_numeric_fallback() {
        let table = test_table();
        let mut resolver = PaletteResolver::new(&table);
        assert_eq!(resolver.resolve(&BlockDescriptor::legacy_numeric(35, 14)), 4);
        assert_eq!(resolver.resolve(&BlockDescriptor::legacy_numeric(1, 1)), 2);
    }

    #[test]
    fn test_bare_name_with_implicit_namespace() {
        let table = test_table();
        let mut resolver = PaletteResolver::new(&table);
        let desc = BlockDescriptor::with_properties(
            "wool",
            props(&[("color", StateValue::String("purple".into()))]),
        );
        assert_eq!(resolver.resolve(&desc), 3);
    }

    #[test]
    fn test_legacy_named_prefixed() {
        let table = test_table();
        let mut resolver = PaletteResolver::new(&table);
        assert_eq!(resolver.resolve(&BlockDescriptor::legacy_named("wool", 14)), 4);
    }

    #[test]
    fn test_unknown_mapping_is_idempotent() {
        let table = test_table();
        let mut resolver = PaletteResolver::new(&table);
        let desc = BlockDescriptor::named("mod:reactor_core");
        let first = resolver.resolve(&desc);
        let second = resolver.resolve(&desc);
        assert_eq!(first, table.unknown());
        assert_eq!(first, second);
        assert_eq!(resolver.unknown_count(), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_loose_property_match() {
        let table = BlockTable::new(vec![BlockTableEntry::new("minecraft:lever").states(props(&[
            ("open_bit", StateValue::Bool(true)),
            ("facing", StateValue::Int(3)),
        ]))])
        .unwrap();
        let from_text = props(&[
            ("open_bit", StateValue::String("true".into())),
            ("facing", StateValue::String("3".into())),
        ]);
        assert_eq!(table.lookup_state("minecraft:lever", &from_text), Some(1));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let result = BlockTable::new(vec![
            BlockTableEntry::new("minecraft:dirt"),
            BlockTableEntry::new("minecraft:dirt"),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateState(_))));
    }

    #[test]
    fn test_palette_builder_first_seen_order() {
        let mut builder = PaletteBuilder::with_air(0);
        assert_eq!(builder.intern(7), (1, true));
        assert_eq!(builder.intern(3), (2, true));
        assert_eq!(builder.intern(7), (1, false));
        assert_eq!(builder.intern(0), (0, false));
        assert_eq!(builder.entries(), &[0, 7, 3]);
    }

    #[test]
    fn test_state_string_roundtrip() {
        let properties = props(&[
            ("color", StateValue::String("red".into())),
            ("open_bit", StateValue::Bool(false)),
            ("age", StateValue::Int(3)),
        ]);
        let text = format_state_string(&properties);
        assert_eq!(text, r#"["age"=3,"color"="red","open_bit"=false]"#);
        assert_eq!(parse_state_string(&text).unwrap(), properties);
    }

    #[test]
    fn test_parse_state_string_variants() {
        assert_eq!(parse_state_string("[]").unwrap(), BlockProperties::new());
        let parsed = parse_state_string("[facing=north,lit=true]").unwrap();
        assert_eq!(parsed["facing"], StateValue::String("north".into()));
        assert_eq!(parsed["lit"], StateValue::Bool(true));
        assert!(parse_state_string("[novalue]").is_none());
    }

    #[test]
    fn test_json_table_with_pool() {
        let json = r#"{
            "blocks": [
                {"name": "minecraft:stone", "legacy_id": 1, "legacy_data": 0},
                {"name": "minecraft:glass", "legacy_id": 20, "legacy_data": 0}
            ],
            "pools": {"117": [{"name": "minecraft:glass"}, {"name": "minecraft:nope"}]}
        }"#;
        let table = BlockTable::from_json_str(json).unwrap();
        assert_eq!(table.runtime_pool_entry(117, 0), Some(2));
        assert_eq!(table.runtime_pool_entry(117, 1), Some(table.unknown()));
        assert_eq!(table.runtime_pool_entry(1, 0), None);
        assert_eq!(table.legacy_of(2), Some((20, 0)));
    }
}
