use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the stderr `fmt` subscriber with the given filter directive.
pub fn install(filter: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
