//! Bedrock `.mcstructure`: uncompressed little-endian tags, X-major index
//! lists for the primary and secondary (waterlog) layers, and a palette of
//! block states.

use std::io::{Read, Write};
use std::path::Path;

use byteorder::LittleEndian;
use sunconvert_nbt::{BedrockReader, BedrockWriter, CompoundExt, NbtCompound, NbtList, NbtTag, TagExt, TagType};
use sunconvert_voxel::select::Int32Elements;
use sunconvert_voxel::{
    Area, BlockDescriptor, BlockPos, BlockProperties, BlockRegistry, BoundingBox, ElementSource, PaletteBuilder,
    PaletteResolver, RuntimeId, Size, StateValue, World,
};
use tracing::debug;

use crate::Format;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan};
use crate::selection::{IndexOrder, Selection};
use crate::source::{ReadSession, Transport};
use crate::structure::{BlockRecord, Metadata, SharedRegistry, Structure};

const NAME: &str = "mcstructure";

/// Block-state version stamped on written palette entries.
const BLOCK_VERSION: i32 = 18_100_737;

/// Index list value meaning "no block here".
const NO_BLOCK: i32 = -1;

pub struct McStructure {
    session: ReadSession,
    registry: SharedRegistry,
    bounds: BoundingBox,
    origin: BlockPos,
    format_version: i32,
    palette: Vec<RuntimeId>,
    /// Offset just past the outer `block_indices` list header.
    indices_offset: u64,
    /// Element counts of the two index lists.
    layer_lengths: [usize; 2],
    metadata: Metadata,
    entities: Vec<NbtCompound>,
}

fn state_value(tag: &NbtTag) -> Option<StateValue> {
    Some(match tag {
        NbtTag::Byte(v) => StateValue::Bool(*v != 0),
        NbtTag::Short(v) => StateValue::Int(i32::from(*v)),
        NbtTag::Int(v) => StateValue::Int(*v),
        NbtTag::String(v) => StateValue::String(v.clone()),
        _ => return None,
    })
}

fn state_tag(value: &StateValue) -> NbtTag {
    match value {
        StateValue::Bool(v) => NbtTag::Byte(i8::from(*v)),
        StateValue::Int(v) => NbtTag::Int(*v),
        StateValue::String(v) => NbtTag::String(v.clone()),
    }
}

fn int_triple(tag: NbtTag, field: &'static str) -> Result<[i32; 3], StructureError> {
    let values: Vec<i32> = match tag {
        NbtTag::List(items) => items.iter().filter_map(TagExt::to_i32).collect(),
        _ => Vec::new(),
    };
    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(StructureError::format(NAME, format!("{field} must be a list of three ints"))),
    }
}

/// Parts of the `structure` compound.
#[derive(Default)]
struct StructureFields {
    indices_offset: Option<u64>,
    layer_lengths: [usize; 2],
    palette: Option<NbtCompound>,
    entities: Vec<NbtCompound>,
}

impl McStructure {
    pub fn open(path: &Path, registry: SharedRegistry) -> Result<Self, StructureError> {
        let session = ReadSession::new(path, Transport::Plain, NAME);
        let mut reader = session.open_nbt::<LittleEndian>()?;
        let (root_type, _) = reader.read_tag_header().context("root tag")?;
        if root_type != TagType::Compound {
            return Err(StructureError::format(NAME, "root tag is not a compound"));
        }

        let mut format_version = 0;
        let mut size = None;
        let mut world_origin = [0; 3];
        let mut fields = None;
        loop {
            let (ty, name) = reader.read_tag_header().context("tag header")?;
            match (ty, name.as_str()) {
                (TagType::End, _) => break,
                (TagType::Int, "format_version") => format_version = reader.read_i32().context("format_version")?,
                (TagType::List, "size") => size = Some(int_triple(reader.read_value(ty).context("size")?, "size")?),
                (TagType::List, "structure_world_origin") => {
                    world_origin = int_triple(
                        reader.read_value(ty).context("structure_world_origin")?,
                        "structure_world_origin",
                    )?;
                }
                (TagType::Compound, "structure") => fields = Some(Self::read_structure(&mut reader)?),
                _ => reader.skip_value(ty).context("unknown tag")?,
            }
        }

        let [w, h, l] = size.ok_or_else(|| StructureError::format(NAME, "missing size"))?;
        if w <= 0 || h <= 0 || l <= 0 {
            return Err(StructureError::format(NAME, format!("non-positive size {w}x{h}x{l}")));
        }
        let size = Size::new(w, h, l);
        let fields = fields.ok_or_else(|| StructureError::format(NAME, "missing structure"))?;
        let indices_offset = fields
            .indices_offset
            .ok_or_else(|| StructureError::format(NAME, "missing block_indices"))?;
        let volume = size.volume();
        if fields.layer_lengths[0] != volume {
            return Err(StructureError::format(
                NAME,
                format!("block_indices[0] holds {} entries, expected {volume}", fields.layer_lengths[0]),
            ));
        }

        let mut palette = Vec::new();
        let mut metadata = Metadata::new();
        if let Some(default) = fields.palette {
            let mut resolver = PaletteResolver::new(registry.as_ref());
            let entries = default.get_list("block_palette").into_iter().flat_map(|list| list.iter());
            for entry in entries.filter_map(TagExt::as_compound) {
                let name = entry.get_str("name").unwrap_or_default();
                let properties: BlockProperties = entry
                    .get_compound("states")
                    .map(|states| {
                        states
                            .inner()
                            .iter()
                            .filter_map(|(k, v)| state_value(v).map(|v| (k.clone(), v)))
                            .collect()
                    })
                    .unwrap_or_default();
                palette.push(resolver.resolve(&BlockDescriptor::with_properties(name, properties)));
            }
            if resolver.unknown_count() > 0 {
                debug!("{} mcstructure palette entries map to the unknown block", resolver.unknown_count());
            }

            if let Some(positions) = default.get_compound("block_position_data") {
                for (key, value) in positions.inner() {
                    let Ok(index) = key.parse::<usize>() else { continue };
                    let Some(data) = value.as_compound().and_then(|v| v.get_compound("block_entity_data")) else {
                        continue;
                    };
                    if index < volume {
                        let (x, y, z) = IndexOrder::XYZ.position(size, index);
                        metadata.insert(BlockPos::new(x, y, z), data.clone());
                    }
                }
            }
        }

        debug!(
            "Parsed mcstructure v{} {}x{}x{}, palette {}, block_indices at {} ({} + {} entries)",
            format_version,
            w,
            h,
            l,
            palette.len(),
            indices_offset,
            fields.layer_lengths[0],
            fields.layer_lengths[1]
        );

        Ok(Self {
            session,
            registry,
            bounds: BoundingBox::new(size),
            origin: BlockPos::new(world_origin[0], world_origin[1], world_origin[2]),
            format_version,
            palette,
            indices_offset,
            layer_lengths: fields.layer_lengths,
            metadata,
            entities: fields.entities,
        })
    }

    fn read_structure<R: Read>(reader: &mut BedrockReader<R>) -> Result<StructureFields, StructureError> {
        let mut fields = StructureFields::default();
        loop {
            let (ty, name) = reader.read_tag_header().context("structure tag")?;
            match (ty, name.as_str()) {
                (TagType::End, _) => break,
                (TagType::List, "block_indices") => {
                    let (elem, count) = reader.read_list_header().context("block_indices")?;
                    if count != 2 || elem != TagType::List {
                        return Err(StructureError::format(NAME, "block_indices must hold two lists"));
                    }
                    fields.indices_offset = Some(reader.offset());
                    for length in &mut fields.layer_lengths {
                        let (elem, len) = reader.read_list_header().context("block_indices")?;
                        if len > 0 && elem != TagType::Int {
                            return Err(StructureError::format(NAME, "block_indices entries must be ints"));
                        }
                        reader.skip_bytes(len as u64 * 4).context("block_indices")?;
                        *length = len;
                    }
                }
                (TagType::List, "entities") => {
                    if let NbtTag::List(items) = reader.read_value(ty).context("entities")? {
                        fields.entities = items.iter().filter_map(TagExt::as_compound).cloned().collect();
                    }
                }
                (TagType::Compound, "palette") => loop {
                    let (ty, name) = reader.read_tag_header().context("palette")?;
                    match (ty, name.as_str()) {
                        (TagType::End, _) => break,
                        (TagType::Compound, "default") => {
                            fields.palette = Some(reader.read_compound().context("palette")?);
                        }
                        _ => reader.skip_value(ty).context("palette")?,
                    }
                },
                _ => reader.skip_value(ty).context("structure tag")?,
            }
        }
        Ok(fields)
    }

    pub fn format_version(&self) -> i32 {
        self.format_version
    }

    /// Entity compounds stored alongside the blocks.
    pub fn entities(&self) -> &[NbtCompound] {
        &self.entities
    }

    fn has_secondary_layer(&self) -> bool {
        self.layer_lengths[1] == self.layer_lengths[0]
    }

    /// Streams the selected entries of each layer in index order. Entries of
    /// [`NO_BLOCK`] are passed through as negative values.
    fn scan<F>(&self, runs: &[std::ops::Range<usize>], layers: usize, mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(usize, usize, i32) -> Result<(), StructureError>,
    {
        if runs.is_empty() {
            return Ok(());
        }
        let mut reader = self.session.open_nbt::<LittleEndian>()?;
        reader.advance_to(self.indices_offset).context("block_indices")?;
        for layer in 0..layers {
            let (_, len) = reader.read_list_header().context("block_indices")?;
            let mut elements = Int32Elements::<_, LittleEndian>::new(reader, len);
            let mut cursor = 0;
            for run in runs {
                elements.skip_values(run.start - cursor).context("block_indices")?;
                for index in run.clone() {
                    let value = elements.next_value().context("block_indices")? as i32;
                    visit(index, layer, value)?;
                }
                cursor = run.end;
            }
            elements.skip_rest().context("block_indices")?;
            reader = elements.into_inner();
        }
        Ok(())
    }

    fn resolve(&self, value: i32) -> Option<RuntimeId> {
        if value < 0 {
            return None;
        }
        Some(
            self.palette
                .get(value as usize)
                .copied()
                .unwrap_or_else(|| self.registry.unknown()),
        )
    }
}

impl Structure for McStructure {
    fn kind(&self) -> Format {
        Format::McStructure
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

    fn origin(&self) -> BlockPos {
        self.origin
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn visit_blocks(&self, selection: &Selection, visit: &mut dyn FnMut(BlockRecord)) -> Result<(), StructureError> {
        let size = self.bounds.original_size();
        let air = self.registry.air();
        let layers = if self.has_secondary_layer() { 2 } else { 1 };
        self.scan(&selection.runs(IndexOrder::XYZ), layers, |index, layer, value| {
            if let Some(id) = self.resolve(value).filter(|&id| id != air) {
                let (x, y, z) = IndexOrder::XYZ.position(size, index);
                visit(BlockRecord { x, y, z, layer, id });
            }
            Ok(())
        })
    }

    fn count_non_air_blocks(&self) -> Result<usize, StructureError> {
        let air = self.registry.air();
        let mut count = 0;
        self.scan(&Selection::all(self.bounds.original_size()).runs(IndexOrder::XYZ), 1, |_, _, value| {
            if self.resolve(value).is_some_and(|id| id != air) {
                count += 1;
            }
            Ok(())
        })?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn palette_entry(registry: &dyn BlockRegistry, id: RuntimeId) -> NbtTag {
    let mut entry = NbtCompound::new();
    let mut states = NbtCompound::new();
    let name = match registry.state_of(id).or_else(|| registry.state_of(registry.unknown())) {
        Some(state) => {
            for (key, value) in &state.properties {
                states.insert(key.clone(), state_tag(value));
            }
            state.name.clone()
        }
        None => "minecraft:air".to_string(),
    };
    entry.insert("name", name);
    entry.insert("states", states);
    entry.insert("version", BLOCK_VERSION);
    NbtTag::Compound(entry)
}

fn int_list(values: [i32; 3]) -> NbtTag {
    NbtTag::List(NbtList::from(values.into_iter().map(NbtTag::Int).collect::<Vec<_>>()))
}

/// Writes `area` of `world` as an mcstructure.
///
/// The palette grows in first-seen order while the primary list streams out;
/// the secondary list reuses it and writes [`NO_BLOCK`] wherever layer 1 is
/// air. The palette itself follows the data.
pub fn encode<W: Write>(
    world: &dyn World,
    registry: &dyn BlockRegistry,
    out: W,
    area: Area,
    options: &EncodeOptions,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let size = area.size();
    let volume = size.volume();
    let air = registry.air();
    let mut scan = RegionScan::new(world, options.dimension, area, air);
    progress.start(scan.xyz_units() * 2);

    let mut writer = BedrockWriter::new(out);
    writer.begin_compound("").context("root")?;
    writer
        .write_named("format_version", &NbtTag::Int(options.mcstructure_format_version))
        .context("format_version")?;
    writer
        .write_named("size", &int_list([size.width, size.height, size.length]))
        .context("size")?;
    writer.begin_compound("structure").context("structure")?;

    writer.write_tag_header(TagType::List, "block_indices").context("block_indices")?;
    writer.write_list_header(TagType::List, 2).context("block_indices")?;
    let mut palette = PaletteBuilder::new();
    writer.write_list_header(TagType::Int, volume).context("block_indices")?;
    scan.for_each_xyz(0, progress, |_, id| {
        let (index, _) = palette.intern(id);
        writer.write_i32(index as i32).context("block_indices")
    })?;
    writer.write_list_header(TagType::Int, volume).context("block_indices")?;
    scan.for_each_xyz(1, progress, |_, id| {
        let value = if id == air { NO_BLOCK } else { palette.intern(id).0 as i32 };
        writer.write_i32(value).context("block_indices")
    })?;

    writer
        .write_named("entities", &NbtTag::List(NbtList::new()))
        .context("entities")?;
    writer.begin_compound("palette").context("palette")?;
    writer.begin_compound("default").context("palette")?;
    let entries: Vec<NbtTag> = palette
        .entries()
        .iter()
        .map(|&id| palette_entry(registry, id))
        .collect();
    writer
        .write_named("block_palette", &NbtTag::List(NbtList::from(entries)))
        .context("block_palette")?;

    let mut positions = NbtCompound::new();
    for (local, mut record) in scan.metadata()? {
        record.insert("x", local.x);
        record.insert("y", local.y);
        record.insert("z", local.z);
        let index = IndexOrder::XYZ.index(size, local.x, local.y, local.z);
        let mut wrapper = NbtCompound::new();
        wrapper.insert("block_entity_data", record);
        positions.insert(index.to_string(), wrapper);
    }
    writer
        .write_named("block_position_data", &NbtTag::Compound(positions))
        .context("block_position_data")?;
    writer.end_compound().context("palette")?;
    writer.end_compound().context("palette")?;
    writer.end_compound().context("structure")?;

    let min = area.min();
    writer
        .write_named("structure_world_origin", &int_list([min.x, min.y, min.z]))
        .context("structure_world_origin")?;
    writer.end_compound().context("root")?;
    writer.into_inner().flush().map_err(StructureError::io("flush output"))?;

    debug!(
        "Encoded mcstructure {}x{}x{}, palette {}",
        size.width,
        size.height,
        size.length,
        palette.len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
