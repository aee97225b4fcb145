//! IBImport: `"IBImport "` followed by XOR-obfuscated segments, each
//! `[varint length][key][payload ^ key]`. Segment 0 is a `setblock` script,
//! segment 1 an optional JSON array of command-block records.

use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use byteorder::ReadBytesExt;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sunconvert_nbt::{CompoundExt, NbtCompound, NbtTag};
use sunconvert_voxel::{
    Area, BlockDescriptor, BlockPos, BlockProperties, BlockRegistry, PaletteResolver, StateValue, World,
};
use tracing::debug;

use crate::Format;
use crate::entity::{json_bool, json_int};
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan, SubChunkOrder};
use crate::source::{ReadSession, Transport};
use crate::sparse::{SparseBuilder, SparseStructure};
use crate::structure::SharedRegistry;

const NAME: &str = "ibimport";
const MAGIC: &[u8] = b"IBImport ";
const XOR_KEY: u8 = 193;
/// Length placeholder: a five-byte varint of zero, patched once the segment
/// is complete.
const LENGTH_PLACEHOLDER: [u8; 5] = [0x80, 0x80, 0x80, 0x80, 0x00];
const MAX_SEGMENT_LEN: u64 = (1 << 35) - 1;

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Reads the rest of a LEB128 varint whose first byte is `first`.
fn read_varint(reader: &mut impl Read, first: u8) -> Result<u32, StructureError> {
    let mut value = u32::from(first & 0x7F);
    let mut byte = first;
    let mut shift = 0;
    while byte & 0x80 != 0 {
        shift += 7;
        if shift >= 32 {
            return Err(StructureError::format(NAME, "segment length varint is too long"));
        }
        byte = reader.read_u8().context("segment length")?;
        value |= u32::from(byte & 0x7F) << shift;
    }
    Ok(value)
}

/// Reads and de-obfuscates every segment until the stream ends.
fn read_segments(reader: &mut impl Read) -> Result<Vec<Vec<u8>>, StructureError> {
    let mut segments = Vec::new();
    loop {
        let mut first = [0u8; 1];
        if reader.read(&mut first).context("segment length")? == 0 {
            break;
        }
        let len = read_varint(reader, first[0])?;
        let key = reader.read_u8().context("segment key")?;
        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data).context("segment payload")?;
        for b in &mut data {
            *b ^= key;
        }
        segments.push(data);
    }
    Ok(segments)
}

/// Fixed-width five-byte varint, so a placeholder can be patched in place.
fn fixed_varint(value: u64) -> Result<[u8; 5], StructureError> {
    if value > MAX_SEGMENT_LEN {
        return Err(StructureError::format(NAME, format!("segment of {value} bytes is too long")));
    }
    let mut out = [0u8; 5];
    let mut v = value;
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (v & 0x7F) as u8;
        v >>= 7;
        if i < 4 {
            *byte |= 0x80;
        }
    }
    Ok(out)
}

/// Writes one segment, obfuscating as it goes and patching the length on
/// [`finish`](Self::finish).
struct SegmentWriter<'o, W: Write + Seek> {
    out: &'o mut W,
    length_at: u64,
    key: u8,
    written: u64,
}

impl<'o, W: Write + Seek> SegmentWriter<'o, W> {
    fn begin(out: &'o mut W, key: u8) -> io::Result<Self> {
        let length_at = out.stream_position()?;
        out.write_all(&LENGTH_PLACEHOLDER)?;
        out.write_all(&[key])?;
        Ok(Self {
            out,
            length_at,
            key,
            written: 0,
        })
    }

    fn finish(self) -> Result<(), StructureError> {
        let encoded = fixed_varint(self.written)?;
        let end = self.out.stream_position().context("segment length")?;
        self.out.seek(SeekFrom::Start(self.length_at)).context("segment length")?;
        self.out.write_all(&encoded).context("segment length")?;
        self.out.seek(SeekFrom::Start(end)).context("segment length")?;
        Ok(())
    }
}

impl<W: Write + Seek> Write for SegmentWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let masked: Vec<u8> = buf.iter().map(|b| b ^ self.key).collect();
        self.out.write_all(&masked)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A command-block record from segment 1.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandRecord {
    #[serde(rename = "posX")]
    pos_x: String,
    #[serde(rename = "posY")]
    pos_y: String,
    #[serde(rename = "posZ")]
    pos_z: String,
    #[serde(rename = "CommandMessage")]
    command: String,
    #[serde(rename = "Commandtitle")]
    title: String,
    #[serde(rename = "isTime")]
    tick_delay: Value,
    #[serde(rename = "Conditional")]
    conditional: Value,
    #[serde(rename = "isRedstone")]
    redstone: Value,
}

/// `~n`, `n` or empty, each relative to the script origin.
fn relative(token: &str) -> i32 {
    let token = token.trim();
    token.strip_prefix('~').unwrap_or(token).parse().unwrap_or(0)
}

/// Parses `[k=v,...]`; quotes around keys and values are dropped.
fn parse_states(token: &str) -> BlockProperties {
    let inner = token.trim().trim_start_matches('[').trim_end_matches(']').replace("\\\"", "\"");
    inner
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| {
            let key = k.trim_matches(|c| c == ' ' || c == '"').to_string();
            let value = v.trim_matches(|c| c == ' ' || c == '"');
            (key, StateValue::parse_loose(value))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `setblock x y z name [states]`.
fn parse_setblock(line: &str) -> Option<(BlockPos, BlockDescriptor)> {
    if !line.starts_with("setblock ") {
        return None;
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    let pos = BlockPos::new(relative(parts[1]), relative(parts[2]), relative(parts[3]));
    let properties = parts.get(5).map(|t| parse_states(t)).unwrap_or_default();
    Some((pos, BlockDescriptor::with_properties(parts[4], properties)))
}

/// Command text is stored either plain or as canonical base64 of UTF-8.
fn decode_command(text: &str) -> String {
    if text.contains([' ', '\t', '\r', '\n']) {
        return text.to_string();
    }
    for engine in [&STANDARD, &STANDARD_NO_PAD] {
        let Ok(bytes) = engine.decode(text) else { continue };
        if engine.encode(&bytes) != text {
            continue;
        }
        if let Ok(decoded) = String::from_utf8(bytes) {
            return decoded;
        }
    }
    text.to_string()
}

fn command_block_record(command: &CommandRecord) -> NbtCompound {
    let mut nbt = NbtCompound::new();
    nbt.insert("id", "CommandBlock");
    nbt.insert("Command", decode_command(&command.command));
    nbt.insert("CustomName", command.title.as_str());
    nbt.insert("ExecuteOnFirstTick", false);
    nbt.insert("TrackOutput", false);
    nbt.insert("conditionalMode", json_bool(Some(&command.conditional)));
    nbt.insert("auto", !json_bool(Some(&command.redstone)));
    nbt.insert("TickDelay", json_int(&command.tick_delay).unwrap_or(0) as i32);
    nbt.insert("LastOutput", "");
    nbt.insert("Version", NbtTag::Int(38));
    nbt
}

/// Parses an IBImport file into a position-indexed document.
pub fn open(path: &Path, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
    let mut reader = ReadSession::new(path, Transport::Plain, NAME).with_magic(MAGIC).open()?;
    let segments = read_segments(&mut reader)?;
    let Some(script) = segments.first() else {
        return Err(StructureError::format(NAME, "no segments"));
    };
    let script = String::from_utf8_lossy(script);
    let commands: Vec<CommandRecord> = match segments.get(1) {
        Some(json) => serde_json::from_slice(json).map_err(StructureError::json(NAME))?,
        None => Vec::new(),
    };

    let mut resolver = PaletteResolver::new(registry.as_ref());
    let mut builder = SparseBuilder::new();
    for line in script.lines() {
        let line = line.trim();
        let Some((pos, descriptor)) = parse_setblock(line) else { continue };
        builder.place(pos, resolver.resolve(&descriptor));
    }
    let mut attached = 0;
    for command in &commands {
        let pos = BlockPos::new(relative(&command.pos_x), relative(&command.pos_y), relative(&command.pos_z));
        if builder.contains(pos) {
            builder.set_metadata(pos, command_block_record(command));
            attached += 1;
        }
    }
    debug!(
        "IBImport: {} segments, {} blocks, {} of {} command records attached, {} unresolved",
        segments.len(),
        builder.len(),
        attached,
        commands.len(),
        resolver.unknown_count()
    );
    builder.finish(Format::IbImport, registry)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CommandExport {
    #[serde(rename = "posX")]
    pos_x: String,
    #[serde(rename = "posY")]
    pos_y: String,
    #[serde(rename = "posZ")]
    pos_z: String,
    #[serde(rename = "CommandMessage")]
    command: String,
    #[serde(rename = "Commandtitle")]
    title: String,
    mode: i32,
    #[serde(rename = "isTime")]
    tick_delay: i64,
    #[serde(rename = "Conditional")]
    conditional: i32,
    #[serde(rename = "isRedstone", skip_serializing_if = "Option::is_none")]
    redstone: Option<bool>,
}

/// `setblock` name and state text for a runtime id.
fn setblock_target(registry: &dyn BlockRegistry, id: u32) -> (String, String) {
    match registry.state_of(id) {
        Some(state) if !state.short_name().trim().is_empty() => {
            (state.short_name().trim().to_string(), state.state_string())
        }
        _ => ("unknown".to_string(), "[]".to_string()),
    }
}

fn command_mode(name: &str) -> i32 {
    match name.strip_prefix("minecraft:").unwrap_or(name) {
        "chain_command_block" => 1,
        "repeating_command_block" => 2,
        _ => 0,
    }
}

fn command_export(local: BlockPos, record: &NbtCompound, mode: i32) -> CommandExport {
    CommandExport {
        pos_x: format!("~{}", local.x),
        pos_y: format!("~{}", local.y),
        pos_z: format!("~{}", local.z),
        command: STANDARD.encode(record.get_str("Command").unwrap_or_default()),
        title: record.get_str("CustomName").unwrap_or_default().to_string(),
        mode,
        tick_delay: record.get_i64("TickDelay").unwrap_or(0),
        conditional: i32::from(record.get_bool("conditionalMode").unwrap_or(false)),
        redstone: (record.get_bool("auto") == Some(false)).then_some(true),
    }
}

/// Writes `area` of `world` as an IBImport file.
///
/// Sub-chunks are visited Y-major, one progress tick each; air is skipped.
/// Command-block records inside the area follow in segment 1.
pub fn encode<W: Write + Seek>(
    world: &dyn World,
    registry: &dyn BlockRegistry,
    out: W,
    area: Area,
    options: &EncodeOptions,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let air = registry.air();
    let mut scan = RegionScan::new(world, options.dimension, area, air);
    let sub_chunks = scan.sub_chunks(SubChunkOrder::YZX);
    progress.start(sub_chunks.len());

    let mut out = BufWriter::new(out);
    out.write_all(MAGIC).context("file header")?;

    let mut lines = 0usize;
    let mut modes: FxHashMap<BlockPos, i32> = FxHashMap::default();
    let mut script = SegmentWriter::begin(&mut out, XOR_KEY).context("script segment")?;
    for pos in sub_chunks {
        scan.for_each_in_sub_chunk(pos, 0, |local, id| {
            if id == air {
                return Ok(());
            }
            let (name, states) = setblock_target(registry, id);
            if name.ends_with("command_block") {
                modes.insert(local, command_mode(&name));
            }
            write!(script, "setblock ~{} ~{} ~{} {} {}\r\n", local.x, local.y, local.z, name, states)
                .context("script segment")?;
            lines += 1;
            Ok(())
        })?;
        progress.tick();
    }
    script.finish()?;

    let mut commands = SegmentWriter::begin(&mut out, XOR_KEY).context("command segment")?;
    commands.write_all(b"[\n").context("command segment")?;
    let mut count = 0usize;
    for (local, record) in scan.metadata()? {
        if record.get_str("id") != Some("CommandBlock") {
            continue;
        }
        let mode = modes.get(&local).copied().unwrap_or(0);
        let json = serde_json::to_string(&command_export(local, &record, mode)).map_err(StructureError::json(NAME))?;
        if count > 0 {
            commands.write_all(b",\n").context("command segment")?;
        }
        write!(commands, "    {json}").context("command segment")?;
        count += 1;
    }
    if count > 0 {
        commands.write_all(b"\n").context("command segment")?;
    }
    commands.write_all(b"]\n").context("command segment")?;
    commands.finish()?;
    out.flush().context("flush output")?;

    debug!("Encoded IBImport with {} setblock lines and {} command records", lines, count);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
