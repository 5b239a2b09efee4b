//! Diagnostic logging
//!
//! Logs go to stderr so they never mix with response bodies or the benchmark
//! report. `RUST_LOG` overrides the level chosen from `--debug`.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Install the global subscriber; later calls are ignored
pub fn init(format: LogFormat, debug: bool) {
    let default_level = if debug { "quick=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug);

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.without_time().try_init(),
    };
    if let Err(e) = result {
        tracing::debug!("logger already installed: {}", e);
    }
}
