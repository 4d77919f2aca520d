// Logging initialization
//
// `RUST_LOG` takes precedence over the configured level when it is set.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{NodeError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber described by `config`
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            NodeError::Logging(format!("Invalid log level {:?}: {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| NodeError::Logging(format!("Failed to set tracing subscriber: {}", e)))
}
