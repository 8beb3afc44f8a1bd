//! Tracing subscriber setup.
//!
//! Logging is off unless `logging.enabled` is set. Output goes to stderr so
//! the fingerprint printed on stdout stays machine-readable.

use tracing::Level;

use crate::config::LoggingConfig;

/// Map a configured level name onto a tracing level. Unknown names fall back to `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install a global `fmt` subscriber according to `config`.
///
/// Returns `false` when logging is disabled or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    if !config.enabled {
        return false;
    }

    tracing_subscriber::fmt()
        .with_max_level(parse_level(&config.level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
