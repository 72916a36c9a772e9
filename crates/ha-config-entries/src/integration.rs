//! Integration trait
//!
//! Native integrations implement [`Integration`] and are registered with
//! [`ConfigEntries`](crate::ConfigEntries), which drives their entries
//! through setup and unload.

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::ConfigEntry;
use crate::flow::FlowHandler;

/// Why an integration could not set up (or unload) an entry
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    /// Transient problem such as the remote service being unreachable.
    /// The entry goes to `SetupRetry` rather than failing permanently.
    #[error("{0}")]
    NotReady(String),

    /// Permanent failure
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Integration: Send + Sync {
    /// Domain this integration owns (e.g., "mylog")
    fn domain(&self) -> &str;

    /// Set up one config entry
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError>;

    /// Unload one previously loaded config entry
    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError>;

    /// Flow used to create new entries, if the integration supports UI setup
    fn config_flow(&self) -> Option<Box<dyn FlowHandler>> {
        None
    }

    /// Flow used to edit an existing entry's options
    fn options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn FlowHandler>> {
        None
    }
}
