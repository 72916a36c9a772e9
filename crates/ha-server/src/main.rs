//! Home Assistant Rust Server
//!
//! Loads stored config entries, sets up their integrations and runs until
//! interrupted.

use anyhow::Result;
use ha_config_entries::{ConfigEntries, Storage};
use ha_mylog::MyLogIntegration;
use ha_service_registry::ServiceRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG_DIR_ENV: &str = "HA_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config";

/// The central Home Assistant instance
pub struct HomeAssistant {
    /// Service registry for service calls
    pub services: Arc<ServiceRegistry>,
    /// Configured integration accounts
    pub config_entries: Arc<ConfigEntries>,
}

impl HomeAssistant {
    /// Create a new Home Assistant instance with its integrations registered
    pub fn new(config_dir: PathBuf) -> Self {
        let services = Arc::new(ServiceRegistry::new());
        let config_entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(config_dir))));
        config_entries.register_integration(Arc::new(MyLogIntegration::new(services.clone())));

        Self {
            services,
            config_entries,
        }
    }

    /// Load stored entries and set each one up
    pub async fn start(&self) -> Result<()> {
        self.config_entries.load().await?;

        for entry_id in self.config_entries.entry_ids() {
            if let Err(e) = self.config_entries.setup(&entry_id).await {
                warn!("Config entry {} did not load: {}", entry_id, e);
            }
        }
        Ok(())
    }

    /// Unload every entry
    pub async fn stop(&self) {
        for result in self.config_entries.unload_all().await {
            if let Err(e) = result {
                warn!("Unload failed during shutdown: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Home Assistant (Rust)");

    let config_dir = std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
    info!("Using config directory {}", config_dir.display());

    let hass = HomeAssistant::new(config_dir);
    hass.start().await?;

    info!(
        "Home Assistant is running with {} config entries and {} services",
        hass.config_entries.len(),
        hass.services.service_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await;

    Ok(())
}
