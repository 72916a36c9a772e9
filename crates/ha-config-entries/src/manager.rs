//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::integration::{Integration, SetupError};
use crate::state_machine::InvalidTransition;
use crate::storage::{Storage, StorageError, StorageFile};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Integration not ready: {0}")]
    NotReady(String),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

/// Config Entries Manager
///
/// Owns every config entry, persists them, and drives setup/unload through
/// the [`Integration`] registered for each entry's domain.
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup/unload
    setup_lock: Mutex<()>,

    integrations: DashMap<String, Arc<dyn Integration>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            integrations: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> ConfigEntriesResult<()> {
        if let Some(file) = self.storage.load::<ConfigEntriesData>(STORAGE_KEY).await? {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                file.data.entries.len(),
                file.version,
                file.minor_version
            );

            for entry in file.data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> ConfigEntriesResult<()> {
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };

        let file = StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);
        self.storage.save(&file).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.entries.insert(entry_id.clone(), entry.clone());

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    ///
    /// The unique id is reserved before the entry is indexed, so concurrent
    /// adds for the same account cannot both succeed.
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            match self
                .by_unique_id
                .entry((entry.domain.clone(), unique_id.clone()))
            {
                Entry::Occupied(_) => {
                    return Err(ConfigEntriesError::AlreadyExists {
                        domain: entry.domain.clone(),
                        unique_id: unique_id.clone(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.entry_id.clone());
                }
            }
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Update an existing entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut updated = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        if let Some(disabled_by) = update.disabled_by {
            updated.disabled_by = disabled_by;
        }
        updated.modified_at = Utc::now();

        self.entries.insert(entry_id.to_string(), updated.clone());
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry, unloading it first
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        self.unload(entry_id).await?;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );

        Ok(entry)
    }

    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.value().clone())
    }

    /// Register the integration that owns a domain
    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        debug!("Registered integration for domain: {}", domain);
        self.integrations.insert(domain, integration);
    }

    /// Look up the integration for a domain
    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|r| r.value().clone())
    }

    /// Set up an entry through its integration
    ///
    /// A `NotReady` failure leaves the entry in `SetupRetry`; any other
    /// failure leaves it in `SetupError`.
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(());
        }

        let entry = self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(integration) = self.integration(&entry.domain) else {
            self.transition(entry_id, ConfigEntryState::Loaded, None)?;
            debug!(
                "No integration for domain {}, marking as loaded",
                entry.domain
            );
            return Ok(());
        };

        match integration.setup_entry(&entry).await {
            Ok(()) => {
                self.transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(SetupError::NotReady(reason)) => {
                warn!("Entry {} not ready, left in setup_retry: {}", entry_id, reason);
                self.transition(entry_id, ConfigEntryState::SetupRetry, Some(reason.clone()))?;
                Err(ConfigEntriesError::NotReady(reason))
            }
            Err(SetupError::Failed(reason)) => {
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    /// Unload an entry
    ///
    /// The integration is only asked to unload entries that actually loaded.
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(()),
            state if !state.is_recoverable() => {
                return Err(ConfigEntriesError::CannotUnload(state));
            }
            _ => {}
        }

        let was_loaded = entry.is_loaded();
        let entry = self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        if was_loaded {
            if let Some(integration) = self.integration(&entry.domain) {
                if let Err(e) = integration.unload_entry(&entry).await {
                    warn!("Unload failed for entry {}: {}", entry_id, e);
                    self.transition(
                        entry_id,
                        ConfigEntryState::FailedUnload,
                        Some(e.to_string()),
                    )?;
                    return Err(ConfigEntriesError::UnloadFailed(e.to_string()));
                }
            }
        }

        self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Get all entry IDs
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setup all entries
    pub async fn setup_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            results.push(self.setup(&entry_id).await);
        }
        results
    }

    /// Unload every entry that is not already unloaded
    pub async fn unload_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            results.push(self.unload(&entry_id).await);
        }
        results
    }
}
