//! Structured logging for SunConvert.
//!
//! Console output with uptime timestamps and module paths, plus a JSON lines
//! file in debug builds for looking back at long conversions. The level comes
//! from the config's `log.level` unless `RUST_LOG` is set.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use sunconvert_config::Config;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name of the JSON log inside the log directory.
pub const LOG_FILE: &str = "sunconvert.log";

const DEFAULT_FILTER: &str = "info";

/// Filter directive for a config, falling back to `info`.
pub fn filter_directive(config: Option<&Config>) -> String {
    config
        .map(|c| c.log.level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// JSON lines layer writing to `file`.
fn json_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - enables the file layer when the config allows it
/// * `config` - source of the level directive and the `json_file` switch
///
/// ```no_run
/// use sunconvert_config::Config;
/// use sunconvert_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), cfg!(debug_assertions), Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_directive(config);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry().with(env_filter).with(console_layer);

    let json_enabled = config.is_none_or(|c| c.log.json_file);
    if debug_build
        && json_enabled
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = File::create(log_dir.join(LOG_FILE))
    {
        subscriber.with(json_layer(log_file)).init();
        return;
    }

    subscriber.init();
}
