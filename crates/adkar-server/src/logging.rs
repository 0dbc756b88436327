use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn setup(service: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    tracing::info!(service, "logging initialized");
    Ok(())
}
