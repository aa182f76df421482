//! In-memory state store.
//!
//! Used by tests and as an ephemeral fallback when the SQLite database
//! cannot be opened. Nothing survives process restart.

use super::StateStore;
use crate::error::{HeraldError, Result};
use crate::lifecycle::LifecycleRecord;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// `RwLock`-guarded map implementation of [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, LifecycleRecord>>,
    settings: RwLock<BTreeMap<String, i64>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get_record(&self, module_id: &str) -> Result<Option<LifecycleRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| HeraldError::Store("record lock poisoned".to_owned()))?;
        Ok(records.get(module_id).cloned())
    }

    fn put_record(&self, module_id: &str, record: &LifecycleRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| HeraldError::Store("record lock poisoned".to_owned()))?;
        records.insert(module_id.to_owned(), record.clone());
        Ok(())
    }

    fn delete_record(&self, module_id: &str) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| HeraldError::Store("record lock poisoned".to_owned()))?;
        records.remove(module_id);
        Ok(())
    }

    fn list_records(&self) -> Result<BTreeMap<String, LifecycleRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| HeraldError::Store("record lock poisoned".to_owned()))?;
        Ok(records.clone())
    }

    fn setting(&self, key: &str) -> Result<Option<i64>> {
        let settings = self
            .settings
            .read()
            .map_err(|_| HeraldError::Store("settings lock poisoned".to_owned()))?;
        Ok(settings.get(key).copied())
    }

    fn set_setting(&self, key: &str, value: i64) -> Result<()> {
        let mut settings = self
            .settings
            .write()
            .map_err(|_| HeraldError::Store("settings lock poisoned".to_owned()))?;
        settings.insert(key.to_owned(), value);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
