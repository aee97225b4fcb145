//! RunAway: a JSON array of `{name, aux, x, y, z}` block records.

use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sunconvert_voxel::{Area, BlockDescriptor, BlockPos, BlockRegistry, PaletteResolver, World};
use tracing::debug;

use crate::Format;
use crate::error::{ReadContext, StructureError};
use crate::pipeline::{EncodeOptions, Progress, RegionScan};
use crate::source::{ReadSession, Transport};
use crate::sparse::{SparseBuilder, SparseStructure};
use crate::structure::SharedRegistry;

const NAME: &str = "runaway";

#[derive(Debug, Deserialize, Serialize)]
struct Entry {
    name: String,
    #[serde(default)]
    aux: i32,
    x: i32,
    y: i32,
    z: i32,
}

/// Parses a RunAway file. Later records at a position replace earlier ones.
pub fn open(path: &Path, registry: SharedRegistry) -> Result<SparseStructure, StructureError> {
    let reader = ReadSession::new(path, Transport::Plain, NAME).open()?;
    let entries: Vec<Entry> = serde_json::from_reader(reader).map_err(StructureError::json(NAME))?;
    if entries.is_empty() {
        return Err(StructureError::format(NAME, "empty record array"));
    }

    let mut resolver = PaletteResolver::new(registry.as_ref());
    let mut builder = SparseBuilder::new();
    for (index, entry) in entries.iter().enumerate() {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(StructureError::format(NAME, format!("record {index} has no block name")));
        }
        let descriptor = match u16::try_from(entry.aux) {
            Ok(aux) => BlockDescriptor::legacy_named(name, aux),
            Err(_) => BlockDescriptor::named(name),
        };
        builder.place(BlockPos::new(entry.x, entry.y, entry.z), resolver.resolve(&descriptor));
    }
    debug!(
        "RunAway: {} records, {} positions, {} unresolved",
        entries.len(),
        builder.len(),
        resolver.unknown_count()
    );
    builder.finish(Format::RunAway, registry)
}

/// Writes `area` of `world` as a RunAway record array.
///
/// Records are emitted Y-major with area-local coordinates; air is skipped.
/// One progress tick per 16-high slab.
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
    out.write_all(b"[").context("record array")?;
    let mut count = 0usize;
    scan.for_each_yzx(0, progress, |local, id| {
        if id == air {
            return Ok(());
        }
        let name = registry
            .state_of(id)
            .map_or_else(|| "unknown".to_string(), |state| state.short_name().to_string());
        let entry = Entry {
            name,
            aux: registry.legacy_of(id).map_or(0, |(_, data)| i32::from(data)),
            x: local.x,
            y: local.y,
            z: local.z,
        };
        out.write_all(if count == 0 { b"\n  " } else { b",\n  " }).context("record array")?;
        serde_json::to_writer(&mut out, &entry).map_err(StructureError::json(NAME))?;
        count += 1;
        Ok(())
    })?;
    out.write_all(b"\n]\n").context("record array")?;
    out.flush().context("flush output")?;

    debug!("Encoded RunAway with {} records", count);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
