//! Error taxonomy for structure parsing, querying and conversion.

use std::io;

use sunconvert_nbt::NbtError;
use sunconvert_voxel::{AreaError, PackError, WorldError};
use thiserror::Error;

/// Errors produced by structure formats and the conversion pipeline.
///
/// Unresolvable block names are not errors: they map to the registry's
/// unknown id and conversion carries on.
#[derive(Debug, Error)]
pub enum StructureError {
    /// The file is not a valid document of the named format.
    #[error("invalid {format} file: {reason}")]
    Format {
        /// Format being parsed.
        format: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// The stream ended while a field was being read.
    #[error("stream ended while reading {field}")]
    TruncatedStream {
        /// Field being read.
        field: &'static str,
    },
    /// A requested region is empty or inverted.
    #[error("invalid region: {reason}")]
    InvalidRegion {
        /// What was wrong with the region.
        reason: String,
    },
    /// Filesystem or handle failure.
    #[error("{operation} failed: {source}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        #[source]
        source: io::Error,
    },
    /// A tagged document field is malformed.
    #[error("malformed tag data in {field}: {source}")]
    Nbt {
        /// Field being read.
        field: &'static str,
        #[source]
        source: NbtError,
    },
    /// A packed index array is inconsistent.
    #[error("packed index array: {0}")]
    Pack(#[source] PackError),
    /// The world collaborator failed.
    #[error(transparent)]
    World(#[from] WorldError),
    /// An embedded JSON document is malformed.
    #[error("malformed JSON in {format} file: {source}")]
    Json {
        /// Format being parsed.
        format: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StructureError {
    pub(crate) fn format(format: &'static str, reason: impl Into<String>) -> Self {
        StructureError::Format {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| StructureError::Io { operation, source }
    }

    pub(crate) fn json(format: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| StructureError::Json { format, source }
    }
}

impl From<AreaError> for StructureError {
    fn from(err: AreaError) -> Self {
        StructureError::InvalidRegion {
            reason: err.to_string(),
        }
    }
}

/// Attaches the name of the field being read to low-level failures.
pub(crate) trait ReadContext<T> {
    fn context(self, field: &'static str) -> Result<T, StructureError>;
}

impl<T> ReadContext<T> for Result<T, io::Error> {
    fn context(self, field: &'static str) -> Result<T, StructureError> {
        self.map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => StructureError::TruncatedStream { field },
            _ => StructureError::Io {
                operation: field,
                source: err,
            },
        })
    }
}

impl<T> ReadContext<T> for Result<T, NbtError> {
    fn context(self, field: &'static str) -> Result<T, StructureError> {
        self.map_err(|err| match err {
            NbtError::UnexpectedEof => StructureError::TruncatedStream { field },
            NbtError::Io(source) => StructureError::Io {
                operation: field,
                source,
            },
            source => StructureError::Nbt { field, source },
        })
    }
}

impl<T> ReadContext<T> for Result<T, PackError> {
    fn context(self, field: &'static str) -> Result<T, StructureError> {
        self.map_err(|err| match err {
            PackError::Exhausted => StructureError::TruncatedStream { field },
            PackError::Io(source) if source.kind() == io::ErrorKind::UnexpectedEof => {
                StructureError::TruncatedStream { field }
            }
            PackError::Io(source) => StructureError::Io {
                operation: field,
                source,
            },
            other => StructureError::Pack(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
