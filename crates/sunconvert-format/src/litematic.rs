//! Litematica `.litematic`: gzip, big-endian tags, a per-region palette and a
//! bit-packed Y-major `BlockStates` long array. Only the first region is read.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::BigEndian;
use flate2::Compression;
use flate2::write::GzEncoder;
use sunconvert_nbt::{CompoundExt, JavaReader, JavaWriter, NbtCompound, NbtList, NbtTag, TagExt, TagType};
use sunconvert_voxel::bit_packed::StreamWords;
use sunconvert_voxel::{
    Area, BlockDescriptor, BlockPos, BlockProperties, BlockRegistry, BoundingBox, ElementSource, PackedReader,
    PackedWriter, PaletteBuilder, PaletteResolver, RuntimeId, Size, StateValue, World, bits_for_palette,
    packed_word_count,
};
use tracing::debug;

use crate::Format;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan};
use crate::selection::{IndexOrder, Selection};
use crate::source::{ReadSession, Transport};
use crate::structure::{BlockRecord, LayerCollector, LayerSink, Metadata, SharedRegistry, Structure};

const NAME: &str = "litematic";
const VERSION: i32 = 6;
const SUB_VERSION: i32 = 1;

/// A parsed litematic region. The packed array stays in the file.
pub struct Litematic {
    session: ReadSession,
    registry: SharedRegistry,
    bounds: BoundingBox,
    origin: BlockPos,
    version: i32,
    data_version: i32,
    palette: Vec<RuntimeId>,
    bits: u8,
    block_states_offset: u64,
    metadata: Metadata,
}

fn xyz(compound: &NbtCompound, field: &'static str) -> Result<(i32, i32, i32), StructureError> {
    match (compound.get_i32("x"), compound.get_i32("y"), compound.get_i32("z")) {
        (Some(x), Some(y), Some(z)) => Ok((x, y, z)),
        _ => Err(StructureError::format(NAME, format!("{field} is missing x/y/z"))),
    }
}

fn palette_descriptor(entry: &NbtCompound) -> Result<BlockDescriptor, StructureError> {
    let name = entry
        .get_str("Name")
        .ok_or_else(|| StructureError::format(NAME, "palette entry without Name"))?;
    let properties: BlockProperties = entry
        .get_compound("Properties")
        .map(|props| {
            props
                .inner()
                .iter()
                .filter_map(|(k, v)| v.as_text().map(|v| (k.clone(), StateValue::parse_loose(v))))
                .collect()
        })
        .unwrap_or_default();
    Ok(BlockDescriptor::with_properties(name, properties))
}

#[derive(Default)]
struct RegionFields {
    position: Option<(i32, i32, i32)>,
    size: Option<(i32, i32, i32)>,
    palette: Vec<RuntimeId>,
    block_states_offset: Option<u64>,
    metadata: Metadata,
}

impl Litematic {
    pub fn open(path: &Path, registry: SharedRegistry) -> Result<Self, StructureError> {
        let session = ReadSession::new(path, Transport::Gzip, NAME);
        let mut reader = session.open_nbt::<BigEndian>()?;
        let (root_type, _) = reader.read_tag_header().context("root tag")?;
        if root_type != TagType::Compound {
            return Err(StructureError::format(NAME, "root tag is not a compound"));
        }

        let mut version = 0;
        let mut data_version = 0;
        let mut region = None;
        loop {
            let (ty, name) = reader.read_tag_header().context("tag header")?;
            match (ty, name.as_str()) {
                (TagType::End, _) => break,
                (TagType::Int, "Version") => version = reader.read_i32().context("Version")?,
                (TagType::Int, "MinecraftDataVersion") => {
                    data_version = reader.read_i32().context("MinecraftDataVersion")?
                }
                (TagType::Compound, "Regions") => region = Some(Self::read_regions(&mut reader, registry.as_ref())?),
                (_, "Regions") => return Err(StructureError::format(NAME, "Regions is not a compound")),
                _ => reader.skip_value(ty).context("unknown tag")?,
            }
        }

        let region = region.ok_or_else(|| StructureError::format(NAME, "missing Regions"))?;
        let (px, py, pz) = region.position.unwrap_or_default();
        let (sx, sy, sz) = region
            .size
            .ok_or_else(|| StructureError::format(NAME, "region without Size"))?;
        let block_states_offset = region
            .block_states_offset
            .ok_or_else(|| StructureError::format(NAME, "region without BlockStates"))?;
        if region.palette.is_empty() {
            return Err(StructureError::format(NAME, "empty BlockStatePalette"));
        }

        // A negative size extends from Position towards lower coordinates.
        let min_corner = |p: i32, s: i32| if s < 0 { p + s + 1 } else { p };
        let origin = BlockPos::new(min_corner(px, sx), min_corner(py, sy), min_corner(pz, sz));
        let size = Size::new(sx.abs(), sy.abs(), sz.abs());
        let bits = bits_for_palette(region.palette.len());

        debug!(
            "Parsed litematic v{} region {}x{}x{}, palette {} ({} bits), BlockStates at {}",
            version,
            size.width,
            size.height,
            size.length,
            region.palette.len(),
            bits,
            block_states_offset
        );

        Ok(Self {
            session,
            registry,
            bounds: BoundingBox::new(size),
            origin,
            version,
            data_version,
            palette: region.palette,
            bits,
            block_states_offset,
            metadata: region.metadata,
        })
    }

    /// Reads the first region and skips the rest.
    fn read_regions<R: Read>(
        reader: &mut JavaReader<R>,
        registry: &dyn BlockRegistry,
    ) -> Result<RegionFields, StructureError> {
        let (ty, _) = reader.read_tag_header().context("Regions")?;
        match ty {
            TagType::End => return Err(StructureError::format(NAME, "no regions")),
            TagType::Compound => {}
            other => return Err(StructureError::format(NAME, format!("region is {other:?}, not a compound"))),
        }

        let mut fields = RegionFields::default();
        let mut resolver = PaletteResolver::new(registry);
        loop {
            let (ty, name) = reader.read_tag_header().context("region tag")?;
            match (ty, name.as_str()) {
                (TagType::End, _) => break,
                (TagType::Compound, "Position") => {
                    fields.position = Some(xyz(&reader.read_compound().context("Position")?, "Position")?);
                }
                (TagType::Compound, "Size") => {
                    fields.size = Some(xyz(&reader.read_compound().context("Size")?, "Size")?);
                }
                (TagType::List, "BlockStatePalette") => {
                    if let NbtTag::List(entries) = reader.read_value(ty).context("BlockStatePalette")? {
                        for entry in entries.iter() {
                            let Some(entry) = entry.as_compound() else {
                                return Err(StructureError::format(NAME, "palette entry is not a compound"));
                            };
                            fields.palette.push(resolver.resolve(&palette_descriptor(entry)?));
                        }
                    }
                }
                (TagType::List, "TileEntities") => {
                    if let NbtTag::List(items) = reader.read_value(ty).context("TileEntities")? {
                        for record in items.iter().filter_map(TagExt::as_compound) {
                            if let Ok((x, y, z)) = xyz(record, "TileEntities") {
                                fields.metadata.insert(BlockPos::new(x, y, z), record.clone());
                            }
                        }
                    }
                }
                (TagType::LongArray, "BlockStates") => {
                    fields.block_states_offset = Some(reader.offset());
                    reader.skip_value(ty).context("BlockStates")?;
                }
                (_, "BlockStates") => return Err(StructureError::format(NAME, "BlockStates is not a long array")),
                _ => reader.skip_value(ty).context("region tag")?,
            }
        }
        if resolver.unknown_count() > 0 {
            debug!("{} litematic palette entries map to the unknown block", resolver.unknown_count());
        }

        loop {
            let (ty, _) = reader.read_tag_header().context("Regions")?;
            if ty == TagType::End {
                break;
            }
            reader.skip_value(ty).context("Regions")?;
        }
        Ok(fields)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    fn open_states(&self) -> Result<PackedReader<StreamWords<JavaReader<Box<dyn Read>>>>, StructureError> {
        let volume = self.bounds.original_size().volume();
        let mut reader = self.session.open_nbt::<BigEndian>()?;
        reader.advance_to(self.block_states_offset).context("BlockStates")?;
        let words = reader.read_length().context("BlockStates")?;
        let expected = packed_word_count(volume, self.bits);
        if words < expected {
            return Err(StructureError::format(
                NAME,
                format!("BlockStates holds {words} words, expected {expected}"),
            ));
        }
        PackedReader::new(StreamWords::new(reader, words), self.bits, volume).context("BlockStates")
    }

    fn resolve(&self, index: u32) -> RuntimeId {
        self.palette
            .get(index as usize)
            .copied()
            .unwrap_or_else(|| self.registry.unknown())
    }

    fn scan<F>(&self, runs: &[std::ops::Range<usize>], mut visit: F) -> Result<(), StructureError>
    where
        F: FnMut(usize, RuntimeId) -> Result<(), StructureError>,
    {
        if runs.is_empty() {
            return Ok(());
        }
        let mut states = self.open_states()?;
        let mut cursor = 0;
        for run in runs {
            states.skip_values(run.start - cursor).context("BlockStates")?;
            for index in run.clone() {
                let value = states.next_value().context("BlockStates")?;
                visit(index, self.resolve(value))?;
            }
            cursor = run.end;
        }
        Ok(())
    }
}

impl Structure for Litematic {
    fn kind(&self) -> Format {
        Format::Litematic
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
        let air = self.registry.air();
        let mut count = 0;
        self.scan(&Selection::all(self.bounds.original_size()).runs(IndexOrder::YZX), |_, id| {
            if id != air {
                count += 1;
            }
            Ok(())
        })?;
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

fn palette_entry(registry: &dyn BlockRegistry, id: RuntimeId) -> NbtCompound {
    let mut entry = NbtCompound::new();
    let Some(state) = registry.state_of(id).or_else(|| registry.state_of(registry.unknown())) else {
        entry.insert("Name", "minecraft:air");
        return entry;
    };
    entry.insert("Name", state.name.as_str());
    if !state.properties.is_empty() {
        let mut properties = NbtCompound::new();
        for (key, value) in &state.properties {
            properties.insert(key.clone(), NbtTag::String(value.to_string()));
        }
        entry.insert("Properties", properties);
    }
    entry
}

fn xyz_compound(x: i32, y: i32, z: i32) -> NbtCompound {
    let mut c = NbtCompound::new();
    c.insert("x", x);
    c.insert("y", y);
    c.insert("z", z);
    c
}

/// Writes `area` of `world` as a single-region litematic.
///
/// The first pass over the region builds the palette (air first), the second
/// streams packed indices straight into the `BlockStates` array.
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
    progress.start(scan.yzx_units() * 2);

    let mut palette = PaletteBuilder::with_air(air);
    let mut non_air = 0i32;
    scan.for_each_yzx(0, progress, |_, id| {
        palette.intern(id);
        if id != air {
            non_air += 1;
        }
        Ok(())
    })?;
    let bits = bits_for_palette(palette.len());
    let words = packed_word_count(volume, bits);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let (min, max) = (area.min(), area.max());
    let mut meta = NbtCompound::new();
    meta.insert("Name", "SunConvert Export");
    meta.insert("Author", options.author.as_str());
    meta.insert(
        "Description",
        format!("({},{},{}) -> ({},{},{})", min.x, min.y, min.z, max.x, max.y, max.z),
    );
    meta.insert("RegionCount", 1);
    meta.insert("TotalVolume", volume as i64);
    meta.insert("TotalBlocks", non_air);
    meta.insert("EnclosingSize", xyz_compound(size.width, size.height, size.length));
    meta.insert("TimeCreated", now);
    meta.insert("TimeModified", now);

    let gzip = GzEncoder::new(out, Compression::new(options.gzip_level.min(9)));
    let mut writer = JavaWriter::new(gzip);
    writer.begin_compound("").context("root")?;
    writer.write_named("Version", &NbtTag::Int(VERSION)).context("Version")?;
    writer
        .write_named("MinecraftDataVersion", &NbtTag::Int(options.data_version))
        .context("MinecraftDataVersion")?;
    writer.write_named("SubVersion", &NbtTag::Int(SUB_VERSION)).context("SubVersion")?;
    writer.write_named("Metadata", &NbtTag::Compound(meta)).context("Metadata")?;

    writer.begin_compound("Regions").context("Regions")?;
    writer.begin_compound("region").context("Regions")?;
    writer
        .write_named("Position", &NbtTag::Compound(xyz_compound(0, 0, 0)))
        .context("Position")?;
    writer
        .write_named("Size", &NbtTag::Compound(xyz_compound(size.width, size.height, size.length)))
        .context("Size")?;
    let entries: Vec<NbtTag> = palette
        .entries()
        .iter()
        .map(|&id| NbtTag::Compound(palette_entry(registry, id)))
        .collect();
    writer
        .write_named("BlockStatePalette", &NbtTag::List(NbtList::from(entries)))
        .context("BlockStatePalette")?;

    writer.write_tag_header(TagType::LongArray, "BlockStates").context("BlockStates")?;
    writer.write_length(words).context("BlockStates")?;
    {
        let mut packed = PackedWriter::new(bits, |word: u64| writer.write_i64(word as i64).map_err(io::Error::from))
            .context("BlockStates")?;
        scan.for_each_yzx(0, progress, |_, id| {
            let index = palette.index_of(id).unwrap_or(0);
            packed.push(index).context("BlockStates")
        })?;
        packed.finish(words).context("BlockStates")?;
    }

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
    for (field, items) in [
        ("Entities", Vec::new()),
        ("TileEntities", tile_entities),
        ("PendingBlockTicks", Vec::new()),
        ("PendingFluidTicks", Vec::new()),
    ] {
        writer
            .write_named(field, &NbtTag::List(NbtList::from(items)))
            .context(field)?;
    }
    writer.end_compound().context("Regions")?;
    writer.end_compound().context("Regions")?;
    writer.end_compound().context("root")?;
    writer.into_inner().finish().map_err(StructureError::io("finish gzip stream"))?;

    debug!(
        "Encoded litematic {}x{}x{}, palette {} ({} bits, {} words)",
        size.width,
        size.height,
        size.length,
        palette.len(),
        bits,
        words
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_registry;
    use std::fs::File;
    use std::path::PathBuf;
    use sunconvert_voxel::{BitPackedArray, BlockTable, ChunkPos, Dimension, MemoryWorld, Offset};

    fn entry(name: &str, props: &[(&str, &str)]) -> NbtTag {
        let mut c = NbtCompound::new();
        c.insert("Name", name);
        if !props.is_empty() {
            let mut p = NbtCompound::new();
            for (k, v) in props {
                p.insert(*k, *v);
            }
            c.insert("Properties", p);
        }
        NbtTag::Compound(c)
    }

    fn write_litematic(dir: &Path, position: (i32, i32, i32), size: (i32, i32, i32), palette: Vec<NbtTag>, indices: &[u32]) -> PathBuf {
        let bits = bits_for_palette(palette.len());
        let packed = BitPackedArray::pack(bits, indices).unwrap();
        let mut region = NbtCompound::new();
        region.insert("Position", xyz_compound(position.0, position.1, position.2));
        region.insert("Size", xyz_compound(size.0, size.1, size.2));
        region.insert("BlockStatePalette", NbtTag::List(NbtList::from(palette)));
        region.insert(
            "BlockStates",
            NbtTag::LongArray(packed.raw_data().iter().map(|&w| w as i64).collect()),
        );
        let mut chest = xyz_compound(1, 0, 1);
        chest.insert("id", "minecraft:chest");
        region.insert("TileEntities", NbtTag::List(NbtList::from(vec![NbtTag::Compound(chest)])));
        let mut regions = NbtCompound::new();
        regions.insert("main", region);
        regions.insert("second", NbtCompound::new());

        let mut root = NbtCompound::new();
        root.insert("Version", 6);
        root.insert("MinecraftDataVersion", 3700);
        root.insert("Regions", regions);

        let path = dir.join("test.litematic");
        let gzip = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut writer = JavaWriter::new(gzip);
        writer.write_root("", &root).unwrap();
        writer.into_inner().finish().unwrap();
        path
    }

    fn cube_palette() -> Vec<NbtTag> {
        vec![
            entry("minecraft:air", &[]),
            entry("minecraft:stone", &[]),
            entry("minecraft:dirt", &[]),
            entry("minecraft:wool", &[("color", "red")]),
        ]
    }

    #[test]
    fn test_cube_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        // Index (y*L + z)*W + x.
        let indices = [1, 2, 0, 3, 0, 0, 1, 0];
        let path = write_litematic(dir.path(), (5, 6, 7), (2, 2, 2), cube_palette(), &indices);
        let registry = test_registry();
        let doc = Litematic::open(&path, registry.clone()).unwrap();
        assert_eq!(doc.version(), 6);
        assert_eq!(doc.data_version(), 3700);
        assert_eq!(doc.origin(), BlockPos::new(5, 6, 7));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 4);
        assert!(doc.metadata().contains_key(&BlockPos::new(1, 0, 1)));

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0)]).unwrap();
        let chunk = &chunks[&ChunkPos::new(0, 0)];
        assert_eq!(chunk.block(0, -64, 0, 0), registry.lookup_name("minecraft:stone").unwrap());
        assert_eq!(chunk.block(1, -64, 0, 0), registry.lookup_name("minecraft:dirt").unwrap());
        assert_eq!(chunk.block(1, -64, 1, 0), 4);
        assert_eq!(chunk.block(0, -63, 1, 0), registry.lookup_name("minecraft:stone").unwrap());
        assert_eq!(chunk.non_air_count(), 4);
    }

    #[test]
    fn test_negative_size_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_litematic(dir.path(), (10, 0, 0), (-3, 1, 1), cube_palette(), &[1, 0, 2]);
        let doc = Litematic::open(&path, test_registry()).unwrap();
        assert_eq!(doc.bounds().original_size(), Size::new(3, 1, 1));
        assert_eq!(doc.origin(), BlockPos::new(8, 0, 0));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 2);
    }

    #[test]
    fn test_unknown_palette_entry_maps_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let palette = vec![entry("minecraft:air", &[]), entry("mod:strange", &[])];
        let path = write_litematic(dir.path(), (0, 0, 0), (1, 1, 1), palette, &[1]);
        let registry = test_registry();
        let doc = Litematic::open(&path, registry.clone()).unwrap();
        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0)]).unwrap();
        assert_eq!(chunks[&ChunkPos::new(0, 0)].block(0, -64, 0, 0), registry.unknown());
    }

    #[test]
    fn test_offset_query_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut indices = vec![0u32; 18];
        indices[0] = 1;
        indices[17] = 2;
        let path = write_litematic(dir.path(), (0, 0, 0), (18, 1, 1), cube_palette(), &indices);
        let registry = test_registry();
        let mut doc = Litematic::open(&path, registry.clone()).unwrap();
        doc.set_offset_pos(Offset::new(0, 3, 0));
        let chunks = doc.get_chunks(&[ChunkPos::new(1, 0)]).unwrap();
        let chunk = &chunks[&ChunkPos::new(1, 0)];
        assert_eq!(chunk.non_air_count(), 1);
        assert_eq!(chunk.block(1, -61, 0, 0), registry.lookup_name("minecraft:dirt").unwrap());
    }

    #[test]
    fn test_missing_regions_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.litematic");
        let gzip = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut writer = JavaWriter::new(gzip);
        let mut root = NbtCompound::new();
        root.insert("Version", 6);
        writer.write_root("", &root).unwrap();
        writer.into_inner().finish().unwrap();
        assert!(matches!(
            Litematic::open(&path, test_registry()),
            Err(StructureError::Format { format: "litematic", .. })
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let registry = test_registry();
        let air = registry.air();
        let d = Dimension::Overworld;
        let mut world = MemoryWorld::new();
        let ids = [1, 2, 3, 4, 5, 6];
        for (i, &id) in ids.iter().enumerate() {
            world.set_block(d, BlockPos::new(i as i32 - 2, 100, 0), 0, id, air);
        }
        let area = Area::from_corners(BlockPos::new(-2, 100, 0), BlockPos::new(4, 101, 1));
        let mut bytes = Vec::new();
        let mut ticks = 0;
        let mut progress = crate::pipeline::ProgressFn::new(|_| {}, || ticks += 1);
        encode(&world, registry.as_ref(), &mut bytes, area, &EncodeOptions::default(), &mut progress).unwrap();
        assert_eq!(ticks, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.litematic");
        std::fs::write(&path, &bytes).unwrap();
        let doc = Litematic::open(&path, registry.clone()).unwrap();
        assert_eq!(doc.bounds().original_size(), Size::new(7, 2, 2));
        assert_eq!(doc.count_non_air_blocks().unwrap(), ids.len());

        let mut seen = Vec::new();
        doc.visit_blocks(&Selection::all(Size::new(7, 2, 2)), &mut |r| seen.push((r.x, r.id)))
            .unwrap();
        let expected: Vec<(i32, RuntimeId)> = ids.iter().enumerate().map(|(i, &id)| (i as i32, id)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_stateless_id_encodes_as_unknown_block() {
        let registry = test_registry();
        let stone = registry.lookup_name("minecraft:stone").unwrap();
        assert_eq!(palette_entry(registry.as_ref(), stone).get_str("Name"), Some("minecraft:stone"));
        let entry = palette_entry(registry.as_ref(), RuntimeId::MAX);
        assert_eq!(entry.get_str("Name"), Some(BlockTable::UNKNOWN));
        assert!(!entry.contains_key("Properties"));
    }
}
