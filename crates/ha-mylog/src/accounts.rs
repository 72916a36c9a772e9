//! Loaded MyLog accounts, one client per config entry

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::api::MyLogApi;

/// Clients keyed by config entry id, in setup order
#[derive(Debug, Default)]
pub struct Accounts {
    clients: RwLock<IndexMap<String, Arc<MyLogApi>>>,
}

impl Accounts {
    pub(crate) fn insert(&self, entry_id: impl Into<String>, api: Arc<MyLogApi>) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_id.into(), api);
    }

    pub(crate) fn remove(&self, entry_id: &str) -> Option<Arc<MyLogApi>> {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(entry_id)
    }

    /// Client for one entry
    pub fn get(&self, entry_id: &str) -> Option<Arc<MyLogApi>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry_id)
            .cloned()
    }

    /// Client of the most recently loaded account
    pub fn current(&self) -> Option<Arc<MyLogApi>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(_, api)| api.clone())
    }

    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
