//! Command-line argument parsing for the `sunconvert` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Config;

/// SunConvert command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "sunconvert", about = "Convert Minecraft structure files between formats")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// JSON block table to resolve block names against.
    #[arg(long, global = true)]
    pub block_table: Option<PathBuf>,

    /// Author recorded in BDX and litematic output.
    #[arg(long, global = true)]
    pub author: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print format, size, origin and block count of a structure file.
    Info {
        /// Structure file to inspect.
        file: PathBuf,
        /// Format name when the extension is ambiguous.
        #[arg(long)]
        format: Option<String>,
    },
    /// Convert a structure file to another format.
    Convert {
        /// Source structure file.
        input: PathBuf,
        /// Destination file; its extension picks the output format.
        output: PathBuf,
        /// Offset applied before placement, as `x,y,z`.
        #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
        offset: Option<[i32; 3]>,
        /// Output format name, overriding the extension.
        #[arg(long)]
        to: Option<String>,
        /// Input format name, overriding detection.
        #[arg(long)]
        from: Option<String>,
    },
}

/// Parses `x,y,z` into three integers.
pub fn parse_triple(text: &str) -> Result<[i32; 3], String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z, got {text:?}"));
    };
    let parse = |v: &str| v.parse::<i32>().map_err(|e| format!("{v:?}: {e}"));
    Ok([parse(*x)?, parse(*y)?, parse(*z)?])
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
        if let Some(ref table) = args.block_table {
            self.registry.block_table = Some(table.clone());
        }
        if let Some(ref author) = args.author {
            self.conversion.author = author.clone();
        }
        if let Command::Convert { offset: Some(offset), .. } = args.command {
            self.conversion.offset = offset;
        }
    }
}
