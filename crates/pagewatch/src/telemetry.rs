//! Tracing subscriber setup.

use pagewatch_common::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns false when a global subscriber was already installed (by the host
/// or an earlier call); that is not an error.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .is_ok()
}
