//! Tracing setup for the agent binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Map a `-v` count to a level name (0=warn, 1=info, 2=debug, 3+=trace).
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the verbosity-derived filter. Logs go to stderr so
/// stdout stays free for status output.
pub fn init_logging(verbosity: u8) -> Result<(), String> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("emg_predict_agent={level},emg_predict={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 2)
                .with_file(verbosity >= 3)
                .with_line_number(verbosity >= 3),
        )
        .try_init()
        .map_err(|e| e.to_string())
}
