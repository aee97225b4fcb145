//! Structure file formats and the conversion pipeline between them and a
//! sub-chunk world.
//!
//! Every format parses into a [`Structure`]: a bounded document whose blocks
//! are decoded on demand, one selection at a time. [`to_world`] writes a
//! document into a [`World`](sunconvert_voxel::World) layer by layer, and each
//! encodable format has an `encode` function that streams a world region back
//! out.

pub mod bdx;
pub mod entity;
pub mod error;
pub mod ibimport;
pub mod kbdx;
pub mod litematic;
pub mod mcfunction;
pub mod mcstructure;
pub mod pipeline;
pub mod qingxu;
pub mod runaway;
pub mod schematic;
pub mod selection;
pub mod source;
pub mod sparse;
pub mod structure;

#[cfg(test)]
mod testutil;

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use sunconvert_voxel::{Area, BlockRegistry, World};
use tracing::info;

pub use error::StructureError;
pub use pipeline::{EncodeOptions, NoProgress, Progress, ProgressFn, to_world};
pub use selection::{IndexOrder, Selection};
pub use sparse::SparseStructure;
pub use structure::{BlockRecord, Metadata, SharedRegistry, Structure};

/// The closed set of supported structure formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Schematic,
    Litematic,
    McStructure,
    Kbdx,
    IbImport,
    Bdx,
    RunAway,
    QingXuV1,
    McFunction,
}

impl Format {
    pub const ALL: [Format; 9] = [
        Format::Schematic,
        Format::Litematic,
        Format::McStructure,
        Format::Kbdx,
        Format::IbImport,
        Format::Bdx,
        Format::RunAway,
        Format::QingXuV1,
        Format::McFunction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Format::Schematic => "schematic",
            Format::Litematic => "litematic",
            Format::McStructure => "mcstructure",
            Format::Kbdx => "kbdx",
            Format::IbImport => "ibimport",
            Format::Bdx => "bdx",
            Format::RunAway => "runaway",
            Format::QingXuV1 => "qingxu_v1",
            Format::McFunction => "mcfunction",
        }
    }

    /// File extension without the dot. RunAway and QingXu share `json`.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Schematic => "schematic",
            Format::Litematic => "litematic",
            Format::McStructure => "mcstructure",
            Format::Kbdx => "kbdx",
            Format::IbImport => "IBImport",
            Format::Bdx => "bdx",
            Format::RunAway | Format::QingXuV1 => "json",
            Format::McFunction => "mcfunction",
        }
    }

    /// Looks a format up by [`name`](Self::name), ignoring case.
    pub fn from_name(name: &str) -> Option<Format> {
        Self::ALL.into_iter().find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Detects the format of an existing file from its extension.
    ///
    /// `.json` files are told apart by content: an array is RunAway and an
    /// object carrying `totalBlocks` is QingXu v1. `Ok(None)` means the file
    /// matches no format.
    pub fn from_path(path: &Path) -> Result<Option<Format>, StructureError> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Ok(None);
        };
        if !ext.eq_ignore_ascii_case("json") {
            return Ok(Self::ALL
                .into_iter()
                .filter(|f| *f != Format::RunAway && *f != Format::QingXuV1)
                .find(|f| f.extension().eq_ignore_ascii_case(ext)));
        }

        let mut text = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut text))
            .map_err(StructureError::io("read JSON document"))?;
        Ok(match text.trim_start().chars().next() {
            Some('[') => Some(Format::RunAway),
            Some('{') if text.contains(&format!("\"{}\"", qingxu::TOTAL_BLOCKS)) => Some(Format::QingXuV1),
            _ => None,
        })
    }

    /// Whether [`encode`](Self::encode) can write this format.
    pub fn is_encodable(self) -> bool {
        !matches!(self, Format::Kbdx | Format::QingXuV1)
    }

    /// Parses `path` as this format.
    pub fn open(self, path: &Path, registry: SharedRegistry) -> Result<Box<dyn Structure>, StructureError> {
        info!("Opening {} as {}", path.display(), self);
        Ok(match self {
            Format::Schematic => Box::new(schematic::Schematic::open(path, registry)?),
            Format::Litematic => Box::new(litematic::Litematic::open(path, registry)?),
            Format::McStructure => Box::new(mcstructure::McStructure::open(path, registry)?),
            Format::Kbdx => Box::new(kbdx::open(path, registry)?),
            Format::IbImport => Box::new(ibimport::open(path, registry)?),
            Format::Bdx => Box::new(bdx::Bdx::open(path, registry)?),
            Format::RunAway => Box::new(runaway::open(path, registry)?),
            Format::QingXuV1 => Box::new(qingxu::open(path, registry)?),
            Format::McFunction => Box::new(mcfunction::open(path, registry)?),
        })
    }

    /// Writes `area` of `world` in this format.
    pub fn encode<W: Write + Seek>(
        self,
        world: &dyn World,
        registry: &dyn BlockRegistry,
        out: W,
        area: Area,
        options: &EncodeOptions,
        progress: &mut dyn Progress,
    ) -> Result<(), StructureError> {
        info!("Encoding {} region of {} blocks", self, area.size().volume());
        match self {
            Format::Schematic => schematic::encode(world, registry, out, area, options, progress),
            Format::Litematic => litematic::encode(world, registry, out, area, options, progress),
            Format::McStructure => mcstructure::encode(world, registry, out, area, options, progress),
            Format::IbImport => ibimport::encode(world, registry, out, area, options, progress),
            Format::Bdx => bdx::encode(world, registry, out, area, options, progress),
            Format::RunAway => runaway::encode(world, registry, out, area, options, progress),
            Format::McFunction => mcfunction::encode(world, registry, out, area, options, progress),
            Format::Kbdx | Format::QingXuV1 => Err(StructureError::format(self.name(), "format is read-only")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
