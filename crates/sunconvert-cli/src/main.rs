//! `sunconvert`: inspect and convert Minecraft structure files.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use sunconvert_config::{CliArgs, Command, Config, default_config_dir};

use crate::commands::{AppError, ConvertRequest};

fn run(args: &CliArgs, config: &Config) -> Result<(), AppError> {
    let registry = commands::load_registry(config)?;
    match &args.command {
        Command::Info { file, format } => {
            let report = commands::info(file, format.as_deref(), registry)?;
            println!("{report}");
        }
        Command::Convert {
            input,
            output,
            from,
            to,
            ..
        } => {
            let request = ConvertRequest {
                input,
                output,
                from: from.as_deref(),
                to: to.as_deref(),
            };
            commands::convert(&request, config, registry)?;
            println!("wrote {}", output.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| ".sunconvert".into());

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    sunconvert_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
