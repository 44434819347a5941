// Tracing log adapter - Structured logging using tracing crate

use tracing_subscriber::EnvFilter;

use crate::adapters::toml_config::LoggingConfig;
use crate::error::{TrimError, TrimResult};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so command output on stdout stays machine-readable. Calling this again
/// after a subscriber is installed is a no-op.
pub fn init_logging(config: &LoggingConfig) -> TrimResult<()> {
    let level = config
        .level
        .parse::<tracing::Level>()
        .map_err(|_| TrimError::config(format!("unknown log level '{}'", config.level)))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
    Ok(())
}
