//! MCEdit / WorldEdit `.schematic`: gzip, big-endian tags, one byte of
//! legacy block id and one byte of data per position, Y-major.

use std::io::{Read, Write};
use std::path::Path;

use byteorder::BigEndian;
use flate2::Compression;
use flate2::write::GzEncoder;
use sunconvert_nbt::{CompoundExt, JavaReader, JavaWriter, NbtList, NbtTag, TagExt, TagType};
use sunconvert_voxel::select::ByteElements;
use sunconvert_voxel::{
    Area, BlockDescriptor, BlockPos, BlockRegistry, BoundingBox, ElementSource, PaletteResolver, RuntimeId, Size,
    World,
};
use tracing::debug;

use crate::Format;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan};
use crate::selection::{IndexOrder, Selection};
use crate::source::{ReadSession, Transport};
use crate::structure::{BlockRecord, LayerCollector, LayerSink, Metadata, SharedRegistry, Structure};

const NAME: &str = "schematic";
const ROOT: &str = "Schematic";

/// Lookup slots for every (id, data nibble) pair.
const LEGACY_SLOTS: usize = 256 * 16;

/// A parsed schematic. Block bytes stay in the file until queried.
pub struct Schematic {
    session: ReadSession,
    registry: SharedRegistry,
    bounds: BoundingBox,
    origin: BlockPos,
    materials: String,
    blocks_offset: u64,
    data_offset: u64,
    lookup: Vec<RuntimeId>,
    metadata: Metadata,
}

fn expect_type(name: &str, actual: TagType, expected: TagType) -> Result<(), StructureError> {
    if actual != expected {
        return Err(StructureError::format(
            NAME,
            format!("expected {name} to be {expected:?}, found {actual:?}"),
        ));
    }
    Ok(())
}

impl Schematic {
    /// Reads the header fields and records where `Blocks` and `Data` start.
    pub fn open(path: &Path, registry: SharedRegistry) -> Result<Self, StructureError> {
        let session = ReadSession::new(path, Transport::Gzip, NAME);
        let mut reader = session.open_nbt::<BigEndian>()?;

        let (root_type, root_name) = reader.read_tag_header().context("root tag")?;
        if root_type != TagType::Compound {
            return Err(StructureError::format(NAME, "root tag is not a compound"));
        }
        if root_name != ROOT {
            return Err(StructureError::format(NAME, format!("unexpected root name {root_name:?}")));
        }

        let mut size = Size::new(0, 0, 0);
        let mut origin = BlockPos::default();
        let mut materials = String::from("Alpha");
        let mut blocks_offset = None;
        let mut data_offset = None;
        let mut metadata = Metadata::new();

        loop {
            let (ty, name) = reader.read_tag_header().context("tag header")?;
            if ty == TagType::End {
                break;
            }
            match name.as_str() {
                "Width" | "Height" | "Length" => {
                    expect_type(&name, ty, TagType::Short)?;
                    let value = reader.read_i16().context("dimensions")? as u16 as i32;
                    match name.as_str() {
                        "Width" => size.width = value,
                        "Height" => size.height = value,
                        _ => size.length = value,
                    }
                }
                "WEOriginX" | "WEOriginY" | "WEOriginZ" => {
                    expect_type(&name, ty, TagType::Int)?;
                    let value = reader.read_i32().context("WEOrigin")?;
                    match name.as_str() {
                        "WEOriginX" => origin.x = value,
                        "WEOriginY" => origin.y = value,
                        _ => origin.z = value,
                    }
                }
                "Materials" => {
                    expect_type(&name, ty, TagType::String)?;
                    materials = reader.read_string().context("Materials")?;
                }
                "TileEntities" => {
                    expect_type(&name, ty, TagType::List)?;
                    if let NbtTag::List(items) = reader.read_value(ty).context("TileEntities")? {
                        for record in items.iter().filter_map(TagExt::as_compound) {
                            if let (Some(x), Some(y), Some(z)) =
                                (record.get_i32("x"), record.get_i32("y"), record.get_i32("z"))
                            {
                                metadata.insert(BlockPos::new(x, y, z), record.clone());
                            }
                        }
                    }
                }
                "Blocks" => {
                    expect_type(&name, ty, TagType::ByteArray)?;
                    blocks_offset = Some(reader.offset());
                    reader.skip_value(ty).context("Blocks")?;
                }
                "Data" => {
                    expect_type(&name, ty, TagType::ByteArray)?;
                    data_offset = Some(reader.offset());
                    reader.skip_value(ty).context("Data")?;
                }
                _ => reader.skip_value(ty).context("unknown tag")?,
            }
        }

        let (Some(blocks_offset), Some(data_offset)) = (blocks_offset, data_offset) else {
            return Err(StructureError::format(NAME, "missing Blocks or Data"));
        };

        let mut resolver = PaletteResolver::new(registry.as_ref());
        let air = registry.air();
        let lookup: Vec<RuntimeId> = (0..LEGACY_SLOTS)
            .map(|slot| {
                let (id, data) = ((slot >> 4) as u16, (slot & 0x0F) as u16);
                if id == 0 {
                    air
                } else {
                    resolver.resolve(&BlockDescriptor::legacy_numeric(id, data))
                }
            })
            .collect();

        debug!(
            "Parsed schematic {}x{}x{} ({} materials), Blocks at {}, Data at {}, {} tile entities, {} unmapped legacy ids",
            size.width,
            size.height,
            size.length,
            materials,
            blocks_offset,
            data_offset,
            metadata.len(),
            resolver.unknown_count()
        );

        Ok(Self {
            session,
            registry,
            bounds: BoundingBox::new(size),
            origin,
            materials,
            blocks_offset,
            data_offset,
            lookup,
            metadata,
        })
    }

    pub fn materials(&self) -> &str {
        &self.materials
    }

    fn open_array(
        &self,
        offset: u64,
        field: &'static str,
    ) -> Result<ByteElements<JavaReader<Box<dyn Read>>>, StructureError> {
        let volume = self.bounds.original_size().volume();
        let mut reader = self.session.open_nbt::<BigEndian>()?;
        reader.advance_to(offset).context(field)?;
        let len = reader.read_length().context(field)?;
        if len < volume {
            return Err(StructureError::format(
                NAME,
                format!("{field} holds {len} entries, expected {volume}"),
            ));
        }
        Ok(ByteElements::new(reader, volume))
    }

    /// Walks `Blocks` and `Data` in lockstep over `runs`.
    fn scan<F>(&self, runs: &[std::ops::Range<usize>], mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(usize, RuntimeId) -> Result<(), StructureError>,
    {
        if runs.is_empty() {
            return Ok(());
        }
        let mut blocks = self.open_array(self.blocks_offset, "Blocks")?;
        let mut data = self.open_array(self.data_offset, "Data")?;
        let mut cursor = 0;
        for run in runs {
            blocks.skip_values(run.start - cursor).context("Blocks")?;
            data.skip_values(run.start - cursor).context("Data")?;
            for index in run.clone() {
                let id = blocks.next_value().context("Blocks")? as usize;
                let nibble = data.next_value().context("Data")? as usize & 0x0F;
                visit(index, self.lookup[(id << 4) | nibble])?;
            }
            cursor = run.end;
        }
        Ok(())
    }
}

impl Structure for Schematic {
    fn kind(&self) -> Format {
        Format::Schematic
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
        self.scan(&selection.runs(IndexOrder::YZX), |index, id| {
            if id != air {
                let (x, y, z) = IndexOrder::YZX.position(size, index);
                visit(BlockRecord::new(x, y, z, id));
            }
            Ok(())
        })
    }

    fn count_non_air_blocks(&self) -> Result<usize, StructureError> {
        let mut blocks = self.open_array(self.blocks_offset, "Blocks")?;
        let mut count = 0;
        while blocks.remaining() > 0 {
            if blocks.next_value().context("Blocks")? != 0 {
                count += 1;
            }
        }
        Ok(count)
    }

    fn decode_layers(&self, sink: &mut LayerSink<'_>) -> Result<(), StructureError> {
        let size = self.bounds.original_size();
        let air = self.registry.air();
        let mut collector = LayerCollector::new(sink);
        self.scan(&Selection::all(size).runs(IndexOrder::YZX), |index, id| {
            let (x, y, z) = IndexOrder::YZX.position(size, index);
            if id == air {
                return collector.advance_to(y);
            }
            collector.push(BlockRecord::new(x, y, z, id))
        })?;
        collector.finish(size.sub_chunk_layers())
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn legacy_bytes(registry: &dyn BlockRegistry, id: RuntimeId) -> (u8, u8) {
    if registry.is_air(id) {
        return (0, 0);
    }
    match registry.legacy_of(id) {
        Some((block, data)) => (u8::try_from(block).unwrap_or(0), (data & 0x0F) as u8),
        None => (0, 0),
    }
}

/// Writes `area` of `world` as a gzip-compressed schematic.
///
/// `Blocks` and `Data` are written by two Y-major passes over the region, so
/// neither array is held in memory.
pub fn encode<W: Write>(
    world: &dyn World,
    registry: &dyn BlockRegistry,
    out: W,
    area: Area,
    options: &EncodeOptions,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let size = area.size();
    let short = |v: i32| {
        i16::try_from(v).map_err(|_| StructureError::InvalidRegion {
            reason: format!("schematic dimensions must fit in 16 bits, got {v}"),
        })
    };
    let (width, height, length) = (short(size.width)?, short(size.height)?, short(size.length)?);
    let volume = size.volume();

    let mut scan = RegionScan::new(world, options.dimension, area, registry.air());
    progress.start(scan.yzx_units() * 2);

    let gzip = GzEncoder::new(out, Compression::new(options.gzip_level.min(9)));
    let mut writer = JavaWriter::new(gzip);
    writer.begin_compound(ROOT).context("root")?;
    writer.write_named("Width", &NbtTag::Short(width)).context("Width")?;
    writer.write_named("Height", &NbtTag::Short(height)).context("Height")?;
    writer.write_named("Length", &NbtTag::Short(length)).context("Length")?;
    writer.write_named("Materials", &NbtTag::from("Alpha")).context("Materials")?;
    let min = area.min();
    writer.write_named("WEOriginX", &NbtTag::Int(min.x)).context("WEOrigin")?;
    writer.write_named("WEOriginY", &NbtTag::Int(min.y)).context("WEOrigin")?;
    writer.write_named("WEOriginZ", &NbtTag::Int(min.z)).context("WEOrigin")?;

    for (field, data_half) in [("Blocks", false), ("Data", true)] {
        writer.write_tag_header(TagType::ByteArray, field).context(field)?;
        writer.write_length(volume).context(field)?;
        scan.for_each_yzx(0, progress, |_, id| {
            let (block, data) = legacy_bytes(registry, id);
            let byte = if data_half { data } else { block };
            writer.write_u8(byte).context(field)
        })?;
    }

    writer
        .write_named("Entities", &NbtTag::List(NbtList::new()))
        .context("Entities")?;
    let tile_entities: Vec<NbtTag> = scan
        .metadata()?
        .into_iter()
        .map(|(local, mut record)| {
            record.insert("x", local.x);
            record.insert("y", local.y);
            record.insert("z", local.z);
            NbtTag::Compound(record)
        })
        .collect();
    writer
        .write_named("TileEntities", &NbtTag::List(NbtList::from(tile_entities)))
        .context("TileEntities")?;
    writer.end_compound().context("root")?;

    writer.into_inner().finish().map_err(StructureError::io("finish gzip stream"))?;
    debug!("Encoded schematic {}x{}x{}", size.width, size.height, size.length);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
