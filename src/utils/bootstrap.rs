//! Bootstrap utilities for fraud-desk binaries.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LOG_ENV_VAR};
use crate::storage::{init_storage, RecordStore};

/// Initialize tracing with the FRAUD_DESK_LOG environment variable.
///
/// Defaults to "info" level if FRAUD_DESK_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration and open the configured store.
pub async fn load_and_connect(
    config_path: Option<&str>,
) -> Result<(Config, Arc<dyn RecordStore>), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    let store = init_storage(&config.storage).await?;
    info!(
        storage = %config.storage.storage_type,
        per_page = config.pagination.default_per_page,
        "Configuration loaded"
    );
    Ok((config, store))
}
