//! Config Entries
//!
//! This crate provides the configuration entry system. Config entries
//! represent individual configured accounts of an integration and this crate
//! manages their lifecycle (setup, unload, reload) and the data entry flows
//! that create and edit them.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`Integration`] - Implemented by native integrations
//! - [`FlowManager`] / [`FlowHandler`] - Config and options flows
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking.

pub mod entry;
pub mod flow;
pub mod integration;
pub mod manager;
pub mod state_machine;
pub mod storage;

pub use entry::{
    ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate,
};
pub use flow::{
    FlowContext, FlowError, FlowHandler, FlowManager, FlowResult, FlowResultType, FormField,
    ABORT_ALREADY_CONFIGURED,
};
pub use integration::{Integration, SetupError};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
pub use state_machine::InvalidTransition;
pub use storage::{Storage, StorageError, StorageFile, StorageResult};
