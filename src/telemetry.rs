//! Log output for the engine and its tooling.
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Install the global `fmt` subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
