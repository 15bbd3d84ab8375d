//! `flowreg` startup binary.
//!
//! Loads configuration, installs tracing, assembles the registry and checks
//! that stored content is reachable, then waits for shutdown.

use tracing::{info, warn};

use flowreg_registry::telemetry::{init_tracing, LogSettings};
use flowreg_registry::{build_registry, RegistryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_settings = LogSettings::from_env();
    let _file_guard = init_tracing(&log_settings);

    info!(
        log_format = log_settings.format_name(),
        log_file = log_settings.file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = RegistryConfig::from_env()?;
    info!(
        subsystem = "registry",
        persistence = %config.persistence,
        storage_dir = %config.storage_dir.display(),
        validate_storage = config.validate_storage,
        "Configuration loaded"
    );

    let registry = build_registry(&config).await?;

    let buckets = registry.list_buckets().await?;
    info!(
        subsystem = "registry",
        provider = registry.provider_name(),
        result_count = buckets.len(),
        version = env!("CARGO_PKG_VERSION"),
        "flowreg ready"
    );

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(subsystem = "registry", "Shutdown signal received"),
        Err(e) => warn!(subsystem = "registry", error = %e, "Signal handler failed, exiting"),
    }

    Ok(())
}
