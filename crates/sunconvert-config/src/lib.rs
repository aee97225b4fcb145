//! Configuration for SunConvert.
//!
//! Settings persist to disk as a RON file and are overridden per run from the
//! command line. Library crates never read this directly; the binary turns it
//! into parameters such as the format crate's encode options.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, Command, parse_triple};
pub use config::{CONFIG_FILE, Config, ConversionConfig, LogConfig, RegistryConfig, default_config_dir};
pub use error::ConfigError;
