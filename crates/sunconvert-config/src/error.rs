//! Configuration error types.

use std::io;
use std::path::PathBuf;

/// Errors raised while loading, saving or parsing `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config directory or file could not be written.
    #[error("cannot write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("{} is not a valid config: {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// Serializing to RON failed.
    #[error("cannot serialize config: {0}")]
    SerializeError(#[source] ron::Error),
}
