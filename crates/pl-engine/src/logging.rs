//! Subscriber setup for binaries.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LoggingConfig};

/// Parse a configured level name.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

/// Install the global subscriber. `RUST_LOG` directives take precedence over
/// the configured level. Output goes to stderr so stdout stays clean for
/// reports.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
        "pretty" => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init(),
        other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
