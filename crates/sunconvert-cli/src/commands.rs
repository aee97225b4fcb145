//! The `info` and `convert` subcommands.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sunconvert_config::Config;
use sunconvert_format::{EncodeOptions, Format, ProgressFn, SharedRegistry, Structure, StructureError, to_world};
use sunconvert_voxel::{Area, AreaError, BlockPos, BlockTable, Dimension, MemoryWorld, Offset, RegistryError, SubChunkPos};
use thiserror::Error;
use tracing::{debug, info};

/// Failures surfaced to the user by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// No block table was configured.
    #[error("no block table configured; pass --block-table or set registry.block_table in config.ron")]
    NoBlockTable,
    /// The block table could not be loaded.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The file's format could not be determined.
    #[error("cannot tell the format of {0}; pass it explicitly")]
    UnknownFormat(String),
    /// A format name given on the command line is not supported.
    #[error("unsupported format name {0:?}")]
    BadFormatName(String),
    /// Parsing or encoding failed.
    #[error(transparent)]
    Structure(#[from] StructureError),
    /// The output region is empty.
    #[error(transparent)]
    Area(#[from] AreaError),
    /// The output file could not be created.
    #[error("cannot create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Summary printed by `info`.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub format: Format,
    pub size: (i32, i32, i32),
    pub origin: BlockPos,
    pub non_air: usize,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "format:  {}", self.format)?;
        writeln!(f, "size:    {} x {} x {}", self.size.0, self.size.1, self.size.2)?;
        writeln!(f, "origin:  {}, {}, {}", self.origin.x, self.origin.y, self.origin.z)?;
        write!(f, "blocks:  {}", self.non_air)
    }
}

/// Loads the configured block table.
pub fn load_registry(config: &Config) -> Result<SharedRegistry, AppError> {
    let path = config.registry.block_table.as_deref().ok_or(AppError::NoBlockTable)?;
    Ok(Arc::new(BlockTable::from_json_file(path)?))
}

/// Resolves the format of `path`, preferring an explicit name.
fn resolve_format(path: &Path, name: Option<&str>) -> Result<Format, AppError> {
    if let Some(name) = name {
        return Format::from_name(name).ok_or_else(|| AppError::BadFormatName(name.to_string()));
    }
    Format::from_path(path)?.ok_or_else(|| AppError::UnknownFormat(path.display().to_string()))
}

pub fn info(path: &Path, format: Option<&str>, registry: SharedRegistry) -> Result<Report, AppError> {
    let format = resolve_format(path, format)?;
    let mut structure = format.open(path, registry)?;
    let size = structure.size();
    let report = Report {
        format,
        size: (size.width, size.height, size.length),
        origin: structure.origin(),
        non_air: structure.count_non_air_blocks()?,
    };
    structure.close();
    Ok(report)
}

/// Output area for a document placed at `start` with `offset` applied.
///
/// The extent grows by the absolute offset on each axis. A positive offset
/// pads the low side, a negative one the high side.
fn output_area(structure: &dyn Structure, start: SubChunkPos) -> Result<Area, AreaError> {
    let origin = start.min_block();
    let offset = structure.offset_pos();
    let min = BlockPos::new(
        origin.x - offset.x.max(0),
        origin.y - offset.y.max(0),
        origin.z - offset.z.max(0),
    );
    Area::new(min, structure.size())
}

pub struct ConvertRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
}

/// Decodes `input` into an in-memory world and encodes the covering area
/// into `output`.
pub fn convert(request: &ConvertRequest<'_>, config: &Config, registry: SharedRegistry) -> Result<(), AppError> {
    let started = Instant::now();
    let from = resolve_format(request.input, request.from)?;
    let to = match request.to {
        Some(name) => Format::from_name(name).ok_or_else(|| AppError::BadFormatName(name.to_string()))?,
        None => Format::ALL
            .into_iter()
            .filter(|f| f.is_encodable())
            .find(|f| {
                request
                    .output
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(f.extension()))
            })
            .ok_or_else(|| AppError::UnknownFormat(request.output.display().to_string()))?,
    };
    if !to.is_encodable() {
        return Err(AppError::BadFormatName(to.name().to_string()));
    }

    let conversion = &config.conversion;
    let [ox, oy, oz] = conversion.offset;
    let [sx, sy, sz] = conversion.start_sub_chunk;
    let start = SubChunkPos::new(sx, sy, sz);
    let dimension = Dimension::Overworld;

    let mut structure = from.open(request.input, registry.clone())?;
    structure.set_offset_pos(Offset::new(ox, oy, oz));

    let mut world = MemoryWorld::new();
    let mut decoded = 0usize;
    let mut decode_progress = ProgressFn::new(
        |total| debug!("Decoding {} layers", total),
        || decoded += 1,
    );
    to_world(structure.as_ref(), &mut world, dimension, start, &mut decode_progress)?;
    let area = output_area(structure.as_ref(), start)?;
    structure.close();

    let options = EncodeOptions {
        author: conversion.author.clone(),
        gzip_level: conversion.gzip_level.min(9),
        brotli_quality: conversion.brotli_quality.min(11),
        data_version: conversion.data_version,
        mcstructure_format_version: conversion.mcstructure_format_version,
        dimension,
    };
    let file = File::create(request.output).map_err(|source| AppError::Create {
        path: request.output.display().to_string(),
        source,
    })?;
    let mut encoded = 0usize;
    let mut encode_progress = ProgressFn::new(
        |total| debug!("Encoding {} units", total),
        || encoded += 1,
    );
    to.encode(&world, registry.as_ref(), BufWriter::new(file), area, &options, &mut encode_progress)?;

    info!(
        "Converted {} ({}) to {} ({}) in {:.2?}: {} layers decoded, {} units encoded",
        request.input.display(),
        from,
        request.output.display(),
        to,
        started.elapsed(),
        decoded,
        encoded
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const TABLE: &str = r#"{
        "blocks": [
            {"name": "minecraft:air"},
            {"name": "minecraft:stone", "legacy_id": 1, "legacy_data": 0},
            {"name": "minecraft:glass", "legacy_id": 20, "legacy_data": 0}
        ]
    }"#;

    fn setup(dir: &Path) -> (Config, SharedRegistry) {
        let table = dir.join("blocks.json");
        std::fs::write(&table, TABLE).unwrap();
        let mut config = Config::default();
        config.registry.block_table = Some(table);
        let registry = load_registry(&config).unwrap();
        (config, registry)
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_missing_block_table() {
        assert!(matches!(load_registry(&Config::default()), Err(AppError::NoBlockTable)));
    }

    #[test]
    fn test_info_reports_document() {
        let dir = tempfile::tempdir().unwrap();
        let (_, registry) = setup(dir.path());
        let input = write(dir.path(), "a.mcfunction", "fill 4 60 4 6 60 5 stone\nsetblock 4 62 4 glass\n");
        let report = info(&input, None, registry.clone()).unwrap();
        assert_eq!(report.format, Format::McFunction);
        assert_eq!(report.size, (3, 3, 2));
        assert_eq!(report.origin, BlockPos::new(4, 60, 4));
        assert_eq!(report.non_air, 7);
        assert!(report.to_string().contains("3 x 3 x 2"));

        let unknown = write(dir.path(), "a.txt", "");
        assert!(matches!(info(&unknown, None, registry.clone()), Err(AppError::UnknownFormat(_))));
        assert!(matches!(info(&input, Some("zip"), registry), Err(AppError::BadFormatName(_))));
    }

    #[test]
    fn test_convert_between_formats() {
        let dir = tempfile::tempdir().unwrap();
        let (config, registry) = setup(dir.path());
        let input = write(dir.path(), "a.mcfunction", "fill 0 0 0 1 0 1 stone\nsetblock 0 20 0 glass\n");
        let output = dir.path().join("b.json");
        let request = ConvertRequest {
            input: &input,
            output: &output,
            from: None,
            to: None,
        };
        convert(&request, &config, registry.clone()).unwrap();

        let report = info(&output, None, registry).unwrap();
        assert_eq!(report.format, Format::RunAway);
        assert_eq!(report.size, (2, 21, 2));
        assert_eq!(report.non_air, 5);
    }

    #[test]
    fn test_convert_with_offset_pads_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, registry) = setup(dir.path());
        config.conversion.offset = [2, 0, 0];
        let input = write(dir.path(), "a.mcfunction", "setblock 0 0 0 stone\n");
        let output = dir.path().join("b.mcstructure");
        let request = ConvertRequest {
            input: &input,
            output: &output,
            from: None,
            to: None,
        };
        convert(&request, &config, registry.clone()).unwrap();

        let report = info(&output, None, registry).unwrap();
        assert_eq!(report.size, (3, 1, 1));
        assert_eq!(report.non_air, 1);
    }

    #[test]
    fn test_convert_rejects_read_only_target() {
        let dir = tempfile::tempdir().unwrap();
        let (config, registry) = setup(dir.path());
        let input = write(dir.path(), "a.mcfunction", "setblock 0 0 0 stone\n");
        let output = dir.path().join("b.kbdx");
        let request = ConvertRequest {
            input: &input,
            output: &output,
            from: None,
            to: None,
        };
        assert!(matches!(convert(&request, &config, registry.clone()), Err(AppError::UnknownFormat(_))));

        let forced = ConvertRequest {
            to: Some("kbdx"),
            ..request
        };
        assert!(matches!(convert(&forced, &config, registry), Err(AppError::BadFormatName(_))));
    }
}
