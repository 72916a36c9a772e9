//! MyLog integration entrypoint

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, FlowHandler, Integration, SetupError};
use ha_service_registry::ServiceRegistry;
use tracing::{debug, info};

use crate::accounts::Accounts;
use crate::api::MyLogApi;
use crate::config_flow::{MyLogConfigFlow, MyLogOptionsFlow};
use crate::constants::{API_BASE_URL, CONF_API_KEY, DOMAIN};
use crate::error::MyLogError;
use crate::services;

/// The MyLog integration
///
/// Register it with `ConfigEntries::register_integration`; each config entry
/// then gets its own client while loaded.
pub struct MyLogIntegration {
    services: Arc<ServiceRegistry>,
    api_url: String,
    accounts: Arc<Accounts>,
}

impl MyLogIntegration {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self::with_api_url(services, API_BASE_URL)
    }

    /// Point every client this integration creates at another API root
    pub fn with_api_url(services: Arc<ServiceRegistry>, api_url: impl Into<String>) -> Self {
        Self {
            services,
            api_url: api_url.into(),
            accounts: Arc::new(Accounts::default()),
        }
    }

    /// Currently loaded accounts
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }
}

#[async_trait]
impl Integration for MyLogIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let api_key = entry
            .data_str(CONF_API_KEY)
            .ok_or_else(|| SetupError::Failed(format!("Entry has no {}", CONF_API_KEY)))?;
        let api = Arc::new(MyLogApi::with_api_url(api_key, &self.api_url));

        if let Err(err) = api.health_check().await {
            api.close();
            return Err(match err {
                MyLogError::Connection(_) => {
                    SetupError::NotReady(format!("Cannot connect to MyLog: {}", err))
                }
                other => SetupError::Failed(other.to_string()),
            });
        }

        self.accounts.insert(entry.entry_id.clone(), api);

        if let Err(e) = services::register(&self.services, self.accounts.clone()) {
            if let Some(api) = self.accounts.remove(&entry.entry_id) {
                api.close();
            }
            return Err(SetupError::Failed(e.to_string()));
        }

        info!(entry_id = %entry.entry_id, "MyLog account loaded");
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        if let Some(api) = self.accounts.remove(&entry.entry_id) {
            api.close();
        }

        if self.accounts.is_empty() {
            services::unregister(&self.services);
        } else {
            debug!(
                remaining = self.accounts.len(),
                "Keeping MyLog services for remaining accounts"
            );
        }

        info!(entry_id = %entry.entry_id, "MyLog account unloaded");
        Ok(())
    }

    fn config_flow(&self) -> Option<Box<dyn FlowHandler>> {
        Some(Box::new(MyLogConfigFlow::new(self.api_url.clone())))
    }

    fn options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn FlowHandler>> {
        Some(Box::new(MyLogOptionsFlow::new(self.api_url.clone())))
    }
}
