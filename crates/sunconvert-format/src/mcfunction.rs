//! McFunction: `setblock` and `fill` command scripts.
//!
//! Other commands, blank lines and `#` comments are ignored. Coordinates are
//! plain integers or `~`-relative offsets, both taken as positions relative
//! to the script origin.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use sunconvert_voxel::registry::parse_state_string;
use sunconvert_voxel::{Area, BlockDescriptor, BlockPos, BlockProperties, BlockRegistry, PaletteResolver, World};
use tracing::debug;

use crate::Format;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan};
use crate::source::{ReadSession, Transport};
use crate::sparse::{SparseBuilder, SparseStructure};
use crate::structure::SharedRegistry;

const NAME: &str = "mcfunction";

/// One block-placing command: an inclusive box and the block filling it.
#[derive(Clone, Debug, PartialEq)]
struct Placement {
    from: BlockPos,
    to: BlockPos,
    block: BlockDescriptor,
}

fn coordinate(token: &str) -> Result<i32, String> {
    let value = token.strip_prefix('~').unwrap_or(token);
    if value.is_empty() && token.starts_with('~') {
        return Ok(0);
    }
    value.parse().map_err(|_| format!("bad coordinate {token:?}"))
}

fn position(tokens: &[&str]) -> Result<BlockPos, String> {
    Ok(BlockPos::new(coordinate(tokens[0])?, coordinate(tokens[1])?, coordinate(tokens[2])?))
}

/// Parses one script line. `Ok(None)` for lines that place nothing.
fn parse_line(line: &str) -> Result<Option<Placement>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let lower = line.to_ascii_lowercase();
    if !lower.starts_with("fill ") && !lower.starts_with("setblock ") {
        return Ok(None);
    }

    // The state block may sit anywhere after the name; cut it out first.
    let mut rest = line.to_string();
    let mut properties = BlockProperties::new();
    if let (Some(open), Some(close)) = (line.find('['), line.rfind(']')) {
        if close > open {
            properties = parse_state_string(&line[open..=close])
                .ok_or_else(|| format!("bad block states {:?}", &line[open..=close]))?;
            rest = format!("{} {}", &line[..open], &line[close + 1..]);
        }
    }

    let fields: Vec<&str> = rest.split_whitespace().collect();
    let (from, to, name) = if fields[0].eq_ignore_ascii_case("fill") {
        if fields.len() < 8 {
            return Ok(None);
        }
        (position(&fields[1..4])?, position(&fields[4..7])?, fields[7])
    } else {
        if fields.len() < 5 {
            return Ok(None);
        }
        let pos = position(&fields[1..4])?;
        (pos, pos, fields[4])
    };
    Ok(Some(Placement {
        from,
        to,
        block: BlockDescriptor::with_properties(name, properties),
    }))
}

/// Parses a function file. Later commands overwrite earlier ones.
pub fn open(path: &Path, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
    let reader = BufReader::new(ReadSession::new(path, Transport::Plain, NAME).open()?);
    let mut resolver = PaletteResolver::new(registry.as_ref());
    let mut builder = SparseBuilder::new();
    let mut commands = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("script line")?;
        let placement = parse_line(&line).map_err(|reason| StructureError::format(NAME, format!("line {}: {reason}", index + 1)))?;
        let Some(Placement { from, to, block }) = placement else {
            continue;
        };
        let id = resolver.resolve(&block);
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            for y in from.y.min(to.y)..=from.y.max(to.y) {
                for z in from.z.min(to.z)..=from.z.max(to.z) {
                    builder.place(BlockPos::new(x, y, z), id);
                }
            }
        }
        commands += 1;
    }
    debug!(
        "McFunction: {} commands, {} positions, {} unresolved",
        commands,
        builder.len(),
        resolver.unknown_count()
    );
    builder.finish(Format::McFunction, registry)
}

/// Writes `area` of `world` as one `setblock` line per non-air block, Y-major.
pub fn encode<W: Write>(
    world: &dyn World,
    registry: &dyn BlockRegistry,
    out: W,
    area: Area,
    options: &EncodeOptions,
    progress: &mut dyn Progress,
) -> Result<(), StructureError> {
    let air = registry.air();
    let mut scan = RegionScan::new(world, options.dimension, area, air);
    progress.start(scan.yzx_units());

    let mut out = BufWriter::new(out);
    let mut lines = 0usize;
    scan.for_each_yzx(0, progress, |local, id| {
        if id == air {
            return Ok(());
        }
        write!(out, "setblock ~{} ~{} ~{} ", local.x, local.y, local.z).context("script line")?;
        let written = match registry.state_of(id) {
            Some(state) if state.properties.is_empty() => writeln!(out, "{}", state.short_name()),
            Some(state) => writeln!(out, "{}{}", state.short_name(), state.state_string()),
            None => writeln!(out, "unknown"),
        };
        written.context("script line")?;
        lines += 1;
        Ok(())
    })?;
    out.flush().context("flush output")?;

    debug!("Encoded McFunction with {} setblock lines", lines);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoProgress;
    use crate::structure::Structure;
    use crate::testutil::test_registry;
    use std::path::PathBuf;
    use sunconvert_voxel::{Dimension, MemoryWorld, Size, StateValue};

    fn write_file(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("test.mcfunction");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_parse_line_forms() {
        assert_eq!(parse_line("  # setblock 0 0 0 stone"), Ok(None));
        assert_eq!(parse_line("say hello"), Ok(None));
        assert_eq!(parse_line("setblock 1 2"), Ok(None));

        let placement = parse_line("SetBlock ~ ~-2 7 wool [\"color\"=\"red\"]").unwrap().unwrap();
        assert_eq!(placement.from, BlockPos::new(0, -2, 7));
        assert_eq!(placement.to, placement.from);
        assert_eq!(placement.block.name.as_deref(), Some("wool"));
        assert_eq!(placement.block.properties["color"], StateValue::String("red".into()));

        let fill = parse_line("fill 3 0 0 1 ~1 ~ command_block [conditional_bit=false] replace").unwrap().unwrap();
        assert_eq!(fill.from, BlockPos::new(3, 0, 0));
        assert_eq!(fill.to, BlockPos::new(1, 1, 0));
        assert_eq!(fill.block.properties["conditional_bit"], StateValue::Bool(false));

        assert!(parse_line("setblock ^1 0 0 stone").is_err());
    }

    #[test]
    fn test_fill_and_setblock_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let script = "# demo\n\
                      fill ~0 ~0 ~0 ~2 ~0 ~1 stone\n\
                      \n\
                      setblock ~1 ~0 ~1 wool [\"color\"=\"red\"]\n\
                      tp @s ~ ~ ~\n\
                      setblock 0 1 0 glass\n";
        let path = write_file(dir.path(), script);
        let registry = test_registry();
        let doc = open(&path, registry.clone()).unwrap();

        assert_eq!(doc.kind(), Format::McFunction);
        assert_eq!(doc.bounds().original_size(), Size::new(3, 2, 2));
        assert_eq!(doc.origin(), BlockPos::new(0, 0, 0));
        assert_eq!(doc.count_non_air_blocks().unwrap(), 7);
        let wool = doc.records().iter().find(|r| r.pos() == BlockPos::new(1, 0, 1)).unwrap();
        assert_eq!(wool.id, 4);
        let top = doc.records().last().unwrap();
        assert_eq!((top.pos(), top.id), (BlockPos::new(0, 1, 0), 5));
    }

    #[test]
    fn test_unknown_block_and_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry();
        let path = write_file(dir.path(), "setblock 0 0 0 mystery_block\n");
        let doc = open(&path, registry.clone()).unwrap();
        assert_eq!(doc.records()[0].id, registry.unknown());

        let bad = write_file(dir.path(), "setblock 0 0 0 stone\nsetblock x 0 0 stone\n");
        let err = open(&bad, registry.clone()).err().unwrap();
        assert!(matches!(&err, StructureError::Format { format: "mcfunction", reason } if reason.starts_with("line 2")));

        let empty = write_file(dir.path(), "# nothing here\nsay hi\n");
        assert!(matches!(open(&empty, registry), Err(StructureError::Format { .. })));
    }

    #[test]
    fn test_write_read_round_trip() {
        let registry = test_registry();
        let air = registry.air();
        let d = Dimension::Overworld;
        let mut world = MemoryWorld::new();
        world.set_block(d, BlockPos::new(30, 10, 30), 0, 4, air);
        world.set_block(d, BlockPos::new(31, 10, 30), 0, 1, air);
        world.set_block(d, BlockPos::new(30, 11, 31), 0, 7, air);

        let area = Area::from_corners(BlockPos::new(30, 10, 30), BlockPos::new(31, 11, 31));
        let mut bytes = Vec::new();
        encode(&world, registry.as_ref(), &mut bytes, area, &EncodeOptions::default(), &mut NoProgress).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "setblock ~0 ~0 ~0 wool[\"color\"=\"red\"]",
                "setblock ~1 ~0 ~0 stone",
                "setblock ~0 ~1 ~1 command_block[\"conditional_bit\"=false]",
            ]
        );

        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), &text);
        let doc = open(&path, registry).unwrap();
        let ids: Vec<(BlockPos, u32)> = doc.records().iter().map(|r| (r.pos(), r.id)).collect();
        assert_eq!(
            ids,
            vec![(BlockPos::new(0, 0, 0), 4), (BlockPos::new(1, 0, 0), 1), (BlockPos::new(0, 1, 1), 7)]
        );
    }
}
