//! BDX: `BD@` followed by a brotli stream holding `BDX`, a null-terminated
//! author, one reserved byte and a sequence of opcodes with big-endian
//! operands. Opcodes move an implicit cursor and place blocks at it, naming
//! blocks through a constant-string table built by earlier opcodes.
//!
//! Positions only exist relative to the cursor, so every query replays the
//! stream from the start.

use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use sunconvert_nbt::{BedrockReader, CompoundExt, NbtCompound, NbtList, NbtTag};
use sunconvert_voxel::registry::parse_state_string;
use sunconvert_voxel::{
    Area, BlockDescriptor, BlockPos, BlockRegistry, BoundingBox, PaletteResolver, RuntimeId, World,
};
use tracing::debug;

use crate::Format;
use crate::entity::block_entity_id;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan, SubChunkOrder};
use crate::selection::Selection;
use crate::source::{ReadSession, Transport};
use crate::sparse::extent;
use crate::structure::{BlockRecord, Metadata, SharedRegistry, Structure};

const NAME: &str = "bdx";
const MAGIC: &[u8] = b"BD@";
const STREAM_MAGIC: &[u8] = b"BDX";
const OPERAND: &str = "opcode operand";
const BROTLI_WINDOW: u32 = 22;

/// Command block variants indexed by command block mode.
const COMMAND_BLOCKS: [&str; 3] = ["command_block", "repeating_command_block", "chain_command_block"];

mod op {
    pub const CREATE_CONSTANT_STRING: u8 = 1;
    pub const PLACE_BLOCK_WITH_BLOCK_STATES_DEPRECATED: u8 = 5;
    pub const ADD_INT16_Z_VALUE0: u8 = 6;
    pub const PLACE_BLOCK: u8 = 7;
    pub const ADD_Z_VALUE0: u8 = 8;
    pub const NOP: u8 = 9;
    pub const ADD_INT32_Z_VALUE0: u8 = 12;
    pub const PLACE_BLOCK_WITH_BLOCK_STATES: u8 = 13;
    pub const ADD_X_VALUE: u8 = 14;
    pub const SUBTRACT_X_VALUE: u8 = 15;
    pub const ADD_Y_VALUE: u8 = 16;
    pub const SUBTRACT_Y_VALUE: u8 = 17;
    pub const ADD_Z_VALUE: u8 = 18;
    pub const SUBTRACT_Z_VALUE: u8 = 19;
    pub const ADD_INT16_X_VALUE: u8 = 20;
    pub const ADD_INT32_X_VALUE: u8 = 21;
    pub const ADD_INT16_Y_VALUE: u8 = 22;
    pub const ADD_INT32_Y_VALUE: u8 = 23;
    pub const ADD_INT16_Z_VALUE: u8 = 24;
    pub const ADD_INT32_Z_VALUE: u8 = 25;
    pub const SET_COMMAND_BLOCK_DATA: u8 = 26;
    pub const PLACE_BLOCK_WITH_COMMAND_BLOCK_DATA: u8 = 27;
    pub const ADD_INT8_X_VALUE: u8 = 28;
    pub const ADD_INT8_Y_VALUE: u8 = 29;
    pub const ADD_INT8_Z_VALUE: u8 = 30;
    pub const USE_RUNTIME_ID_POOL: u8 = 31;
    pub const PLACE_RUNTIME_BLOCK: u8 = 32;
    pub const PLACE_RUNTIME_BLOCK_U32: u8 = 33;
    pub const PLACE_RUNTIME_BLOCK_WITH_COMMAND_BLOCK_DATA: u8 = 34;
    pub const PLACE_RUNTIME_BLOCK_WITH_COMMAND_BLOCK_DATA_U32: u8 = 35;
    pub const PLACE_COMMAND_BLOCK_WITH_COMMAND_BLOCK_DATA: u8 = 36;
    pub const PLACE_RUNTIME_BLOCK_WITH_CHEST_DATA: u8 = 37;
    pub const PLACE_RUNTIME_BLOCK_WITH_CHEST_DATA_U32: u8 = 38;
    pub const ASSIGN_DEBUG_DATA: u8 = 39;
    pub const PLACE_BLOCK_WITH_CHEST_DATA: u8 = 40;
    pub const PLACE_BLOCK_WITH_NBT_DATA: u8 = 41;
    pub const TERMINATE: u8 = 88;

    /// `(+1, -1)` opcodes per axis.
    pub const STEP: [(u8, u8); 3] = [
        (ADD_X_VALUE, SUBTRACT_X_VALUE),
        (ADD_Y_VALUE, SUBTRACT_Y_VALUE),
        (ADD_Z_VALUE, SUBTRACT_Z_VALUE),
    ];

    /// `(i8, i16, i32)` relative move opcodes per axis.
    pub const JUMP: [(u8, u8, u8); 3] = [
        (ADD_INT8_X_VALUE, ADD_INT16_X_VALUE, ADD_INT32_X_VALUE),
        (ADD_INT8_Y_VALUE, ADD_INT16_Y_VALUE, ADD_INT32_Y_VALUE),
        (ADD_INT8_Z_VALUE, ADD_INT16_Z_VALUE, ADD_INT32_Z_VALUE),
    ];
}

// ---------------------------------------------------------------------------
// Opcode stream
// ---------------------------------------------------------------------------

/// Block named by a placement opcode, before resolution.
#[derive(Clone, Debug, PartialEq)]
enum BlockRef {
    /// Constant-string name plus legacy data value.
    Legacy { name: u16, data: u16 },
    /// Command block variant chosen by mode, plus legacy data value.
    CommandBlock { mode: u32, data: u16 },
    /// Constant-string name plus constant-string states.
    States { name: u16, states: u16 },
    /// Constant-string name plus inline states.
    InlineStates { name: u16, states: String },
    /// Entry of the active runtime-id pool.
    Runtime(u32),
}

#[derive(Clone, Debug, PartialEq)]
enum Op {
    ConstantString(String),
    UsePool(u8),
    Move { axis: usize, delta: i32 },
    Place { block: BlockRef, nbt: Option<NbtCompound> },
    /// Block data for whatever sits at the cursor.
    BlockData(NbtCompound),
    Nop,
    Terminate,
}

fn read_cstring(reader: &mut impl Read, field: &'static str) -> Result<String, StructureError> {
    let mut bytes = Vec::new();
    loop {
        match reader.read_u8().context(field)? {
            0 => break,
            b => bytes.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_cstring(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.replace('\0', "").as_bytes())?;
    out.write_u8(0)
}

/// Command block operands, returned with their mode.
fn read_command_block_data(reader: &mut impl Read) -> Result<(u32, NbtCompound), StructureError> {
    const FIELD: &str = "command block data";
    let mode = reader.read_u32::<BigEndian>().context(FIELD)?;
    let command = read_cstring(reader, FIELD)?;
    let custom_name = read_cstring(reader, FIELD)?;
    let last_output = read_cstring(reader, FIELD)?;
    let tick_delay = reader.read_i32::<BigEndian>().context(FIELD)?;
    let mut flags = [0u8; 4];
    reader.read_exact(&mut flags).context(FIELD)?;
    let [first_tick, track_output, conditional, needs_redstone] = flags.map(|f| f != 0);

    let mut nbt = NbtCompound::new();
    nbt.insert("id", "CommandBlock");
    nbt.insert("Command", command);
    nbt.insert("CustomName", custom_name);
    nbt.insert("LastOutput", last_output);
    nbt.insert("TickDelay", tick_delay);
    nbt.insert("ExecuteOnFirstTick", first_tick);
    nbt.insert("TrackOutput", track_output);
    nbt.insert("conditionalMode", conditional);
    nbt.insert("auto", !needs_redstone);
    Ok((mode, nbt))
}

fn write_command_block_data(out: &mut impl Write, mode: u32, record: &NbtCompound) -> io::Result<()> {
    out.write_u32::<BigEndian>(mode)?;
    for key in ["Command", "CustomName", "LastOutput"] {
        write_cstring(out, record.get_str(key).unwrap_or_default())?;
    }
    out.write_i32::<BigEndian>(record.get_i32("TickDelay").unwrap_or(0))?;
    let flag = |key| u8::from(record.get_bool(key).unwrap_or(false));
    out.write_all(&[
        flag("ExecuteOnFirstTick"),
        flag("TrackOutput"),
        flag("conditionalMode"),
        1 - flag("auto"),
    ])
}

fn read_chest_data(reader: &mut impl Read) -> Result<NbtCompound, StructureError> {
    const FIELD: &str = "chest data";
    let count = reader.read_u8().context(FIELD)?;
    let mut items = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = read_cstring(reader, FIELD)?;
        let amount = reader.read_u8().context(FIELD)?;
        let damage = reader.read_u16::<BigEndian>().context(FIELD)?;
        let slot = reader.read_u8().context(FIELD)?;
        let mut item = NbtCompound::new();
        item.insert("Name", name);
        item.insert("Count", NbtTag::Byte(amount as i8));
        item.insert("Damage", damage as i16);
        item.insert("Slot", NbtTag::Byte(slot as i8));
        items.push(NbtTag::Compound(item));
    }
    let mut nbt = NbtCompound::new();
    nbt.insert("Items", NbtTag::List(NbtList::from(items)));
    Ok(nbt)
}

/// Reads one opcode and its operands; `None` at a clean end of stream.
fn read_op<R: Read>(reader: &mut R) -> Result<Option<Op>, StructureError> {
    let mut code = [0u8; 1];
    if reader.read(&mut code).context("opcode")? == 0 {
        return Ok(None);
    }
    let op = match code[0] {
        op::CREATE_CONSTANT_STRING => Op::ConstantString(read_cstring(reader, "constant string")?),
        op::PLACE_BLOCK_WITH_BLOCK_STATES_DEPRECATED => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let states = read_cstring(reader, OPERAND)?;
            Op::Place {
                block: BlockRef::InlineStates { name, states },
                nbt: None,
            }
        }
        op::ADD_INT16_Z_VALUE0 => Op::Move {
            axis: 2,
            delta: i32::from(reader.read_u16::<BigEndian>().context(OPERAND)?),
        },
        op::PLACE_BLOCK => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let data = reader.read_u16::<BigEndian>().context(OPERAND)?;
            Op::Place {
                block: BlockRef::Legacy { name, data },
                nbt: None,
            }
        }
        op::ADD_Z_VALUE0 => Op::Move { axis: 2, delta: 1 },
        op::NOP => Op::Nop,
        op::ADD_INT32_Z_VALUE0 => Op::Move {
            axis: 2,
            delta: reader.read_i32::<BigEndian>().context(OPERAND)?,
        },
        op::PLACE_BLOCK_WITH_BLOCK_STATES => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let states = reader.read_u16::<BigEndian>().context(OPERAND)?;
            Op::Place {
                block: BlockRef::States { name, states },
                nbt: None,
            }
        }
        code @ (op::ADD_X_VALUE..=op::SUBTRACT_Z_VALUE) => {
            let step = code - op::ADD_X_VALUE;
            Op::Move {
                axis: usize::from(step / 2),
                delta: if step % 2 == 0 { 1 } else { -1 },
            }
        }
        code @ (op::ADD_INT16_X_VALUE..=op::ADD_INT32_Z_VALUE) => {
            let step = code - op::ADD_INT16_X_VALUE;
            let delta = if step % 2 == 0 {
                i32::from(reader.read_i16::<BigEndian>().context(OPERAND)?)
            } else {
                reader.read_i32::<BigEndian>().context(OPERAND)?
            };
            Op::Move {
                axis: usize::from(step / 2),
                delta,
            }
        }
        op::SET_COMMAND_BLOCK_DATA => Op::BlockData(read_command_block_data(reader)?.1),
        op::PLACE_BLOCK_WITH_COMMAND_BLOCK_DATA => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let data = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let (_, nbt) = read_command_block_data(reader)?;
            Op::Place {
                block: BlockRef::Legacy { name, data },
                nbt: Some(nbt),
            }
        }
        code @ (op::ADD_INT8_X_VALUE..=op::ADD_INT8_Z_VALUE) => Op::Move {
            axis: usize::from(code - op::ADD_INT8_X_VALUE),
            delta: i32::from(reader.read_i8().context(OPERAND)?),
        },
        op::USE_RUNTIME_ID_POOL => Op::UsePool(reader.read_u8().context(OPERAND)?),
        op::PLACE_RUNTIME_BLOCK => Op::Place {
            block: BlockRef::Runtime(u32::from(reader.read_u16::<BigEndian>().context(OPERAND)?)),
            nbt: None,
        },
        op::PLACE_RUNTIME_BLOCK_U32 => Op::Place {
            block: BlockRef::Runtime(reader.read_u32::<BigEndian>().context(OPERAND)?),
            nbt: None,
        },
        op::PLACE_RUNTIME_BLOCK_WITH_COMMAND_BLOCK_DATA | op::PLACE_RUNTIME_BLOCK_WITH_COMMAND_BLOCK_DATA_U32 => {
            let index = if code[0] == op::PLACE_RUNTIME_BLOCK_WITH_COMMAND_BLOCK_DATA {
                u32::from(reader.read_u16::<BigEndian>().context(OPERAND)?)
            } else {
                reader.read_u32::<BigEndian>().context(OPERAND)?
            };
            let (_, nbt) = read_command_block_data(reader)?;
            Op::Place {
                block: BlockRef::Runtime(index),
                nbt: Some(nbt),
            }
        }
        op::PLACE_COMMAND_BLOCK_WITH_COMMAND_BLOCK_DATA => {
            let data = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let (mode, nbt) = read_command_block_data(reader)?;
            Op::Place {
                block: BlockRef::CommandBlock { mode, data },
                nbt: Some(nbt),
            }
        }
        op::PLACE_RUNTIME_BLOCK_WITH_CHEST_DATA | op::PLACE_RUNTIME_BLOCK_WITH_CHEST_DATA_U32 => {
            let index = if code[0] == op::PLACE_RUNTIME_BLOCK_WITH_CHEST_DATA {
                u32::from(reader.read_u16::<BigEndian>().context(OPERAND)?)
            } else {
                reader.read_u32::<BigEndian>().context(OPERAND)?
            };
            Op::Place {
                block: BlockRef::Runtime(index),
                nbt: Some(read_chest_data(reader)?),
            }
        }
        op::ASSIGN_DEBUG_DATA => {
            let len = reader.read_u32::<BigEndian>().context(OPERAND)?;
            let mut debug_data = (&mut *reader).take(u64::from(len));
            let skipped = io::copy(&mut debug_data, &mut io::sink()).context("debug data")?;
            if skipped < u64::from(len) {
                return Err(StructureError::TruncatedStream { field: "debug data" });
            }
            Op::Nop
        }
        op::PLACE_BLOCK_WITH_CHEST_DATA => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let data = reader.read_u16::<BigEndian>().context(OPERAND)?;
            Op::Place {
                block: BlockRef::Legacy { name, data },
                nbt: Some(read_chest_data(reader)?),
            }
        }
        op::PLACE_BLOCK_WITH_NBT_DATA => {
            let name = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let states = reader.read_u16::<BigEndian>().context(OPERAND)?;
            let (_, nbt) = BedrockReader::new(&mut *reader).read_root().context("block NBT")?;
            Op::Place {
                block: BlockRef::States { name, states },
                nbt: Some(nbt),
            }
        }
        op::TERMINATE => Op::Terminate,
        other => return Err(StructureError::format(NAME, format!("unknown opcode {other}"))),
    };
    Ok(Some(op))
}

/// Opens a pass over the opcode stream past its header; returns the author.
fn open_stream(session: &ReadSession) -> Result<(BufReader<Box<dyn Read>>, String), StructureError> {
    let mut reader = BufReader::new(session.open()?);
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic).context("stream header")?;
    if magic != STREAM_MAGIC {
        return Err(StructureError::format(NAME, "missing BDX stream header"));
    }
    let author = read_cstring(&mut reader, "author")?;
    reader.read_u8().context("stream header")?;
    Ok((reader, author))
}

/// What one opcode did once applied.
enum Step {
    /// A block was placed at the cursor.
    Block {
        pos: BlockPos,
        id: RuntimeId,
        nbt: Option<NbtCompound>,
    },
    /// Block data was attached at the cursor without placing anything.
    Data { pos: BlockPos, nbt: NbtCompound },
    /// The cursor moved, or nothing happened.
    Cursor(BlockPos),
    /// The string table or the active pool changed.
    Table,
}

/// Replays an opcode stream: tracks the cursor and constant-string table and
/// resolves placements to runtime ids.
struct Replay<'r, R> {
    reader: R,
    resolver: PaletteResolver<'r>,
    strings: Vec<String>,
    pool: u8,
    cursor: [i32; 3],
    dangling: usize,
}

impl<'r, R: Read> Replay<'r, R> {
    fn new(reader: R, registry: &'r dyn BlockRegistry) -> Self {
        Self {
            reader,
            resolver: PaletteResolver::new(registry),
            strings: Vec::new(),
            pool: 0,
            cursor: [0; 3],
            dangling: 0,
        }
    }

    fn pos(&self) -> BlockPos {
        BlockPos::new(self.cursor[0], self.cursor[1], self.cursor[2])
    }

    fn next(&mut self) -> Result<Option<Step>, StructureError> {
        let Some(op) = read_op(&mut self.reader)? else {
            return Ok(None);
        };
        Ok(Some(match op {
            Op::ConstantString(text) => {
                self.strings.push(text);
                Step::Table
            }
            Op::UsePool(pool) => {
                self.pool = pool;
                Step::Table
            }
            Op::Move { axis, delta } => {
                self.cursor[axis] = self.cursor[axis].wrapping_add(delta);
                Step::Cursor(self.pos())
            }
            Op::Nop => Step::Cursor(self.pos()),
            Op::BlockData(nbt) => Step::Data { pos: self.pos(), nbt },
            Op::Place { block, nbt } => Step::Block {
                pos: self.pos(),
                id: self.resolve(&block),
                nbt,
            },
            Op::Terminate => return Ok(None),
        }))
    }

    fn string(&self, index: u16) -> Option<&str> {
        self.strings.get(usize::from(index)).map(String::as_str)
    }

    fn resolve(&mut self, block: &BlockRef) -> RuntimeId {
        let registry = self.resolver.registry();
        let descriptor = match block {
            BlockRef::Runtime(index) => {
                return match registry.runtime_pool_entry(self.pool, *index) {
                    Some(id) => id,
                    None => {
                        self.dangling += 1;
                        registry.unknown()
                    }
                };
            }
            BlockRef::Legacy { name, data } => self.string(*name).map(|n| BlockDescriptor::legacy_named(n, *data)),
            BlockRef::CommandBlock { mode, data } => COMMAND_BLOCKS
                .get(*mode as usize)
                .map(|n| BlockDescriptor::legacy_named(*n, *data)),
            BlockRef::States { name, states } => match (self.string(*name), self.string(*states)) {
                (Some(name), Some(states)) => Some(stated(name, states)),
                _ => None,
            },
            BlockRef::InlineStates { name, states } => self.string(*name).map(|n| stated(n, states)),
        };
        match descriptor {
            Some(descriptor) => self.resolver.resolve(&descriptor),
            None => {
                self.dangling += 1;
                registry.unknown()
            }
        }
    }
}

fn stated(name: &str, states: &str) -> BlockDescriptor {
    BlockDescriptor::with_properties(name, parse_state_string(states).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A parsed BDX file. Holds the cursor extent and block data; blocks are
/// re-read from the file on every query.
pub struct Bdx {
    session: ReadSession,
    registry: SharedRegistry,
    bounds: BoundingBox,
    min: BlockPos,
    author: String,
    metadata: Metadata,
}

impl Bdx {
    /// Replays the stream once to find the cursor extent and collect block data.
    pub fn open(path: &Path, registry: SharedRegistry) -> Result<Self, StructureError> {
        let session = ReadSession::new(path, Transport::Brotli, NAME).with_magic(MAGIC);
        let (reader, author) = open_stream(&session)?;

        let (min, max, placements, data, dangling, unknown) = {
            let mut replay = Replay::new(reader, registry.as_ref());
            let (mut min, mut max) = ([0i32; 3], [0i32; 3]);
            let mut placements = 0usize;
            let mut data: FxHashMap<BlockPos, NbtCompound> = FxHashMap::default();
            while let Some(step) = replay.next()? {
                let pos = match step {
                    Step::Table => continue,
                    Step::Cursor(pos) => pos,
                    Step::Block { pos, id, nbt } => {
                        placements += 1;
                        if let Some(mut nbt) = nbt {
                            let entity = registry.state_of(id).and_then(|s| block_entity_id(&s.name));
                            if let Some(entity) = entity {
                                nbt.insert("id", entity);
                            }
                            data.insert(pos, nbt);
                        }
                        pos
                    }
                    Step::Data { pos, nbt } => {
                        data.insert(pos, nbt);
                        pos
                    }
                };
                for (axis, v) in [pos.x, pos.y, pos.z].into_iter().enumerate() {
                    min[axis] = min[axis].min(v);
                    max[axis] = max[axis].max(v);
                }
            }
            (min, max, placements, data, replay.dangling, replay.resolver.unknown_count())
        };
        if placements == 0 {
            return Err(StructureError::format(NAME, "no block placements"));
        }

        let min = BlockPos::new(min[0], min[1], min[2]);
        let size = extent(NAME, min, BlockPos::new(max[0], max[1], max[2]))?;
        let metadata: Metadata = data
            .into_iter()
            .map(|(pos, nbt)| (BlockPos::new(pos.x - min.x, pos.y - min.y, pos.z - min.z), nbt))
            .collect();
        debug!(
            "BDX by {:?}: {}x{}x{}, {} placements, {} metadata records, {} unresolved, {} dangling references",
            author,
            size.width,
            size.height,
            size.length,
            placements,
            metadata.len(),
            unknown,
            dangling
        );

        Ok(Self {
            session,
            registry,
            bounds: BoundingBox::new(size),
            min,
            author,
            metadata,
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Replays the stream, handing every placement to `visit` at its
    /// document-local position.
    fn replay_blocks(&self, mut visit: impl FnMut(i32, i32, i32, RuntimeId)) -> Result<(), StructureError> {
        let (reader, _) = open_stream(&self.session)?;
        let mut replay = Replay::new(reader, self.registry.as_ref());
        while let Some(step) = replay.next()? {
            if let Step::Block { pos, id, .. } = step {
                visit(pos.x - self.min.x, pos.y - self.min.y, pos.z - self.min.z, id);
            }
        }
        Ok(())
    }
}

impl Structure for Bdx {
    fn kind(&self) -> Format {
        Format::Bdx
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
        if selection.is_empty() {
            return Ok(());
        }
        self.replay_blocks(|x, y, z, id| {
            if selection.contains(x, y, z) {
                visit(BlockRecord::new(x, y, z, id));
            }
        })
    }

    /// Counts placements of non-air blocks; a position placed twice counts twice.
    fn count_non_air_blocks(&self) -> Result<usize, StructureError> {
        let air = self.registry.air();
        let mut count = 0;
        self.replay_blocks(|_, _, _, id| {
            if id != air {
                count += 1;
            }
        })?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Opcode writer tracking the cursor and the constant-string table.
struct Emitter<'r, W> {
    out: W,
    registry: &'r dyn BlockRegistry,
    cursor: BlockPos,
    palette: FxHashMap<RuntimeId, (u16, u16)>,
    strings: usize,
    placed: usize,
}

impl<'r, W: Write> Emitter<'r, W> {
    fn new(out: W, registry: &'r dyn BlockRegistry) -> Self {
        Self {
            out,
            registry,
            cursor: BlockPos::default(),
            palette: FxHashMap::default(),
            strings: 0,
            placed: 0,
        }
    }

    fn header(&mut self, author: &str) -> io::Result<()> {
        self.out.write_all(STREAM_MAGIC)?;
        write_cstring(&mut self.out, author)?;
        self.out.write_u8(0)
    }

    fn shift(&mut self, axis: usize, delta: i32) -> io::Result<()> {
        let (inc, dec) = op::STEP[axis];
        let (short, medium, long) = op::JUMP[axis];
        match delta {
            0 => Ok(()),
            1 => self.out.write_u8(inc),
            -1 => self.out.write_u8(dec),
            _ => {
                if let Ok(v) = i8::try_from(delta) {
                    self.out.write_u8(short)?;
                    self.out.write_i8(v)
                } else if let Ok(v) = i16::try_from(delta) {
                    self.out.write_u8(medium)?;
                    self.out.write_i16::<BigEndian>(v)
                } else {
                    self.out.write_u8(long)?;
                    self.out.write_i32::<BigEndian>(delta)
                }
            }
        }
    }

    fn move_to(&mut self, target: BlockPos) -> io::Result<()> {
        self.shift(0, target.x - self.cursor.x)?;
        self.shift(1, target.y - self.cursor.y)?;
        self.shift(2, target.z - self.cursor.z)?;
        self.cursor = target;
        Ok(())
    }

    fn constant_string(&mut self, text: &str) -> io::Result<()> {
        self.out.write_u8(op::CREATE_CONSTANT_STRING)?;
        write_cstring(&mut self.out, text)?;
        self.strings += 1;
        Ok(())
    }

    /// Places `id` at the cursor, first defining its name and state string
    /// if this is the first time it appears.
    fn place(&mut self, id: RuntimeId) -> Result<(), StructureError> {
        let (name, states) = match self.palette.get(&id) {
            Some(&pair) => pair,
            None => {
                let (Ok(name), Ok(states)) = (u16::try_from(self.strings), u16::try_from(self.strings + 1)) else {
                    return Err(StructureError::format(NAME, "too many distinct blocks for the constant-string table"));
                };
                let state = self
                    .registry
                    .state_of(id)
                    .or_else(|| self.registry.state_of(self.registry.unknown()));
                let (block, text) = match state {
                    Some(state) => (state.name.clone(), state.state_string()),
                    None => ("minecraft:unknown".to_string(), "[]".to_string()),
                };
                self.constant_string(&block).context("constant string")?;
                self.constant_string(&text).context("constant string")?;
                self.palette.insert(id, (name, states));
                (name, states)
            }
        };
        self.out.write_u8(op::PLACE_BLOCK_WITH_BLOCK_STATES).context("placement")?;
        self.out.write_u16::<BigEndian>(name).context("placement")?;
        self.out.write_u16::<BigEndian>(states).context("placement")?;
        self.placed += 1;
        Ok(())
    }

    /// Attaches command block data to the block at the cursor.
    fn command_block_data(&mut self, id: RuntimeId, record: &NbtCompound) -> io::Result<()> {
        let mode = self
            .registry
            .state_of(id)
            .and_then(|s| COMMAND_BLOCKS.iter().position(|n| s.short_name() == *n))
            .unwrap_or(0);
        self.out.write_u8(op::SET_COMMAND_BLOCK_DATA)?;
        write_command_block_data(&mut self.out, mode as u32, record)
    }
}

/// Writes the area as a BDX file.
///
/// The cursor starts at the area's minimum corner. Sub-chunks are visited Z,
/// then X, then Y, with one progress tick each; blocks inside a sub-chunk X,
/// then Y, then Z. Air is skipped. Command blocks that have a world record
/// get their data written right after the placement.
pub fn encode<W: Write>(
    world: &dyn World,
    registry: &dyn BlockRegistry,
    mut out: W,
    area: Area,
    options: &EncodeOptions,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let air = registry.air();
    let mut scan = RegionScan::new(world, options.dimension, area, air);
    let sub_chunks = scan.sub_chunks(SubChunkOrder::ZXY);
    progress.start(sub_chunks.len());
    let commands: FxHashMap<BlockPos, NbtCompound> = scan
        .metadata()?
        .into_iter()
        .filter(|(_, record)| record.get_str("id") == Some("CommandBlock"))
        .collect();

    out.write_all(MAGIC).context("file header")?;
    let mut stream = brotli::CompressorWriter::new(out, 4096, options.brotli_quality.min(11), BROTLI_WINDOW);
    let mut emitter = Emitter::new(&mut stream, registry);
    emitter.header(&options.author).context("stream header")?;
    for pos in sub_chunks {
        scan.for_each_in_sub_chunk(pos, 0, |local, id| {
            if id == air {
                return Ok(());
            }
            emitter.move_to(local).context("cursor move")?;
            emitter.place(id)?;
            if let Some(record) = commands.get(&local) {
                emitter.command_block_data(id, record).context("command block data")?;
            }
            Ok(())
        })?;
        progress.tick();
    }
    emitter.out.write_u8(op::TERMINATE).context("terminator")?;
    let (placed, distinct) = (emitter.placed, emitter.palette.len());

    stream.flush().context("compress output")?;
    stream.into_inner().flush().context("flush output")?;
    debug!("Encoded BDX with {} placements of {} distinct blocks", placed, distinct);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProgressFn;
    use crate::testutil::test_registry;
    use std::path::PathBuf;
    use std::sync::Arc;
    use sunconvert_nbt::TagExt;
    use sunconvert_voxel::registry::PoolEntry;
    use sunconvert_voxel::{BlockTable, ChunkPos, Dimension, MemoryWorld, Size};

    /// Opcode stream builder for hand-written test files.
    #[derive(Default)]
    struct Ops(Vec<u8>);

    impl Ops {
        fn code(mut self, code: u8) -> Self {
            self.0.push(code);
            self
        }

        fn string(mut self, text: &str) -> Self {
            self.0.extend_from_slice(text.as_bytes());
            self.0.push(0);
            self
        }

        fn u16(mut self, v: u16) -> Self {
            self.0.write_u16::<BigEndian>(v).unwrap();
            self
        }

        fn i32(mut self, v: i32) -> Self {
            self.0.write_i32::<BigEndian>(v).unwrap();
            self
        }

        fn raw(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }

        /// Command block operands with mode 0 and empty name and output.
        fn command_data(self, command: &str, tick_delay: i32, flags: [u8; 4]) -> Self {
            self.raw(&[0, 0, 0, 0])
                .string(command)
                .string("")
                .string("")
                .i32(tick_delay)
                .raw(&flags)
        }
    }

    fn write_bdx(dir: &Path, stream: &[u8]) -> PathBuf {
        let mut bytes = MAGIC.to_vec();
        {
            let mut writer = brotli::CompressorWriter::new(&mut bytes, 4096, 5, BROTLI_WINDOW);
            writer.write_all(stream).unwrap();
            writer.flush().unwrap();
        }
        let path = dir.join("test.bdx");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn header() -> Ops {
        Ops::default().raw(STREAM_MAGIC).string("tester").raw(&[0])
    }

    fn pooled_registry() -> Arc<BlockTable> {
        let table = Arc::try_unwrap(test_registry()).unwrap_or_else(|_| panic!("registry is shared"));
        let pool = [PoolEntry {
            name: "minecraft:dirt".to_string(),
            data: 0,
        }];
        Arc::new(table.with_pool(0, &pool))
    }

    #[test]
    fn test_cube_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let ops = header()
            .code(op::CREATE_CONSTANT_STRING)
            .string("minecraft:stone")
            .code(op::CREATE_CONSTANT_STRING)
            .string("[]")
            .code(op::PLACE_BLOCK_WITH_BLOCK_STATES)
            .u16(0)
            .u16(1)
            .code(op::ADD_X_VALUE)
            .code(op::CREATE_CONSTANT_STRING)
            .string("wool")
            .code(op::CREATE_CONSTANT_STRING)
            .string("[\"color\"=\"red\"]")
            .code(op::PLACE_BLOCK_WITH_BLOCK_STATES)
            .u16(2)
            .u16(3)
            .code(op::ADD_Y_VALUE)
            .code(op::CREATE_CONSTANT_STRING)
            .string("glass")
            .code(op::PLACE_BLOCK)
            .u16(4)
            .u16(0)
            .code(op::SUBTRACT_X_VALUE)
            .code(op::ADD_Z_VALUE)
            .code(op::USE_RUNTIME_ID_POOL)
            .raw(&[0])
            .code(op::PLACE_RUNTIME_BLOCK)
            .u16(0)
            .code(op::TERMINATE)
            .code(op::PLACE_RUNTIME_BLOCK);
        let path = write_bdx(dir.path(), &ops.0);
        let registry = pooled_registry();
        let doc = Bdx::open(&path, registry.clone()).unwrap();

        assert_eq!(doc.kind(), Format::Bdx);
        assert_eq!(doc.author(), "tester");
        assert_eq!(doc.bounds().original_size(), Size::new(2, 2, 2));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 4);

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0)]).unwrap();
        let chunk = &chunks[&ChunkPos::new(0, 0)];
        assert_eq!(chunk.block(0, -64, 0, 0), 1);
        assert_eq!(chunk.block(1, -64, 0, 0), 4);
        assert_eq!(chunk.block(1, -63, 0, 0), 5);
        assert_eq!(chunk.block(0, -63, 1, 0), 2);
        assert_eq!(chunk.non_air_count(), 4);
    }

    #[test]
    fn test_negative_moves_and_block_data() {
        let dir = tempfile::tempdir().unwrap();
        let ops = header()
            .code(op::CREATE_CONSTANT_STRING)
            .string("command_block")
            .code(op::CREATE_CONSTANT_STRING)
            .string("chest")
            .code(op::PLACE_BLOCK_WITH_COMMAND_BLOCK_DATA)
            .u16(0)
            .u16(0)
            .command_data("say hi", 3, [0, 1, 1, 1])
            .code(op::ADD_INT8_X_VALUE)
            .raw(&[(-3i8) as u8])
            .code(op::PLACE_BLOCK_WITH_CHEST_DATA)
            .u16(1)
            .u16(2)
            .raw(&[1])
            .string("apple")
            .raw(&[3])
            .u16(0)
            .raw(&[5])
            .code(op::ADD_INT32_Y_VALUE)
            .i32(20)
            .code(op::ASSIGN_DEBUG_DATA)
            .i32(2)
            .raw(&[9, 9])
            .code(op::PLACE_BLOCK)
            .u16(1)
            .u16(2);
        let path = write_bdx(dir.path(), &ops.0);
        let registry = test_registry();
        let doc = Bdx::open(&path, registry.clone()).unwrap();

        assert_eq!(doc.bounds().original_size(), Size::new(4, 21, 1));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 3);

        let command = &doc.metadata()[&BlockPos::new(3, 0, 0)];
        assert_eq!(command.get_str("id"), Some("CommandBlock"));
        assert_eq!(command.get_str("Command"), Some("say hi"));
        assert_eq!(command.get_i32("TickDelay"), Some(3));
        assert_eq!(command.get_tag("auto"), Some(&NbtTag::Byte(0)));
        assert_eq!(command.get_tag("TrackOutput"), Some(&NbtTag::Byte(1)));

        let chest = &doc.metadata()[&BlockPos::new(0, 0, 0)];
        assert_eq!(chest.get_str("id"), Some("Chest"));
        let item = chest.get_list("Items").unwrap()[0].as_compound().unwrap();
        assert_eq!(item.get_str("Name"), Some("apple"));
        assert_eq!(item.get_tag("Count"), Some(&NbtTag::Byte(3)));
        assert_eq!(item.get_tag("Slot"), Some(&NbtTag::Byte(5)));

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0)]).unwrap();
        let chunk = &chunks[&ChunkPos::new(0, 0)];
        assert_eq!(chunk.block(3, -64, 0, 0), 7);
        assert_eq!(chunk.block(0, -64, 0, 0), 6);
        assert_eq!(chunk.block(0, -44, 0, 0), 6);
    }

    #[test]
    fn test_unknown_names_and_dangling_references() {
        let dir = tempfile::tempdir().unwrap();
        let ops = header()
            .code(op::CREATE_CONSTANT_STRING)
            .string("minecraft:no_such_block")
            .code(op::PLACE_BLOCK)
            .u16(0)
            .u16(0)
            .code(op::ADD_X_VALUE)
            .code(op::PLACE_BLOCK)
            .u16(9)
            .u16(0)
            .code(op::ADD_X_VALUE)
            .code(op::PLACE_RUNTIME_BLOCK)
            .u16(0);
        let path = write_bdx(dir.path(), &ops.0);
        let registry = test_registry();
        let doc = Bdx::open(&path, registry.clone()).unwrap();
        let mut ids = Vec::new();
        doc.visit_blocks(&Selection::all(doc.bounds().original_size()), &mut |r| ids.push(r.id))
            .unwrap();
        assert_eq!(ids, vec![registry.unknown(); 3]);
    }

    #[test]
    fn test_malformed_streams() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry();

        let path = write_bdx(dir.path(), &header().code(200).0);
        assert!(matches!(Bdx::open(&path, registry.clone()), Err(StructureError::Format { format: "bdx", .. })));

        let path = write_bdx(dir.path(), &header().code(op::PLACE_BLOCK).raw(&[0]).0);
        assert!(matches!(
            Bdx::open(&path, registry.clone()),
            Err(StructureError::TruncatedStream { field: OPERAND })
        ));

        let path = write_bdx(dir.path(), &Ops::default().raw(b"XYZ").string("").raw(&[0]).0);
        assert!(matches!(Bdx::open(&path, registry.clone()), Err(StructureError::Format { .. })));

        let path = write_bdx(dir.path(), &header().code(op::ADD_X_VALUE).code(op::TERMINATE).0);
        assert!(matches!(Bdx::open(&path, registry.clone()), Err(StructureError::Format { .. })));

        let path = dir.path().join("plain.bdx");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        assert!(matches!(Bdx::open(&path, registry), Err(StructureError::Format { .. })));
    }

    #[test]
    fn test_write_read_round_trip() {
        let registry = test_registry();
        let air = registry.air();
        let d = Dimension::Overworld;
        let mut world = MemoryWorld::new();
        world.set_block(d, BlockPos::new(-2, 60, -1), 0, 1, air);
        world.set_block(d, BlockPos::new(0, 61, 0), 0, 4, air);
        world.set_block(d, BlockPos::new(5, 60, -1), 0, 7, air);
        world.set_block(d, BlockPos::new(17, 62, 0), 0, 5, air);
        let mut command = NbtCompound::new();
        command.insert("id", "CommandBlock");
        command.insert("Command", "say bdx");
        command.insert("TickDelay", 2);
        command.insert("auto", NbtTag::Byte(1));
        command.insert("x", 5);
        command.insert("y", 60);
        command.insert("z", -1);
        world.push_nbt(d, ChunkPos::new(0, -1), command);

        let area = Area::from_corners(BlockPos::new(17, 62, 0), BlockPos::new(-2, 60, -1));
        let options = EncodeOptions {
            author: "round trip".to_string(),
            ..EncodeOptions::default()
        };
        let mut bytes = Vec::new();
        let (mut total, mut ticks) = (0, 0);
        let mut progress = ProgressFn::new(|t| total = t, || ticks += 1);
        encode(&world, registry.as_ref(), &mut bytes, area, &options, &mut progress).unwrap();
        assert_eq!((total, ticks), (6, 6));

        let mut again = Vec::new();
        encode(&world, registry.as_ref(), &mut again, area, &options, &mut crate::pipeline::NoProgress).unwrap();
        assert_eq!(bytes, again);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bdx");
        std::fs::write(&path, bytes).unwrap();
        let doc = Bdx::open(&path, registry.clone()).unwrap();
        assert_eq!(doc.author(), "round trip");
        assert_eq!(doc.bounds().original_size(), Size::new(20, 3, 2));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 4);

        let chunks = doc.get_chunks(&[ChunkPos::new(0, 0), ChunkPos::new(1, 0)]).unwrap();
        assert_eq!(chunks[&ChunkPos::new(0, 0)].block(0, -64, 0, 0), 1);
        assert_eq!(chunks[&ChunkPos::new(0, 0)].block(2, -63, 1, 0), 4);
        assert_eq!(chunks[&ChunkPos::new(0, 0)].block(7, -64, 0, 0), 7);
        assert_eq!(chunks[&ChunkPos::new(1, 0)].block(3, -62, 1, 0), 5);

        let record = &doc.metadata()[&BlockPos::new(7, 0, 0)];
        assert_eq!(record.get_str("Command"), Some("say bdx"));
        assert_eq!(record.get_i32("TickDelay"), Some(2));
        assert_eq!(record.get_tag("auto"), Some(&NbtTag::Byte(1)));
    }

    #[test]
    fn test_cursor_span_beyond_i32_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ops = header()
            .code(op::CREATE_CONSTANT_STRING)
            .string("minecraft:stone")
            .code(op::PLACE_BLOCK)
            .u16(0)
            .u16(0)
            .code(op::ADD_INT32_X_VALUE)
            .i32(i32::MAX)
            .code(op::PLACE_BLOCK)
            .u16(0)
            .u16(0)
            .code(op::TERMINATE);
        let path = write_bdx(dir.path(), &ops.0);
        assert!(matches!(
            Bdx::open(&path, test_registry()),
            Err(StructureError::Format { format: NAME, .. })
        ));
    }
}
