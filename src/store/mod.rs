//! Durable per-module state and process-wide settings.
//!
//! The [`StateStore`] trait is the single source of truth for "what have we
//! already decided about this module". Two namespaces share one backend:
//! lifecycle records keyed by module ID, and integer process settings keyed
//! by name (booleans are stored as 0/1, matching the registry DWORD layout
//! the settings were originally deployed with).
//!
//! Backends: [`SqliteStore`] for the daemon, [`MemoryStore`] for tests and
//! as an ephemeral fallback.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::lifecycle::LifecycleRecord;
use std::collections::BTreeMap;

/// Key/value contract backing the lifecycle engine.
///
/// Writes must be atomic per module ID; a reader never observes a record
/// with a half-written status. Reads of missing or corrupt values return
/// `None` rather than failing the caller.
pub trait StateStore: Send + Sync {
    /// Fetches the lifecycle record for a module, if one exists.
    fn get_record(&self, module_id: &str) -> Result<Option<LifecycleRecord>>;

    /// Inserts or replaces the lifecycle record for a module.
    fn put_record(&self, module_id: &str, record: &LifecycleRecord) -> Result<()>;

    /// Removes the lifecycle record for a module. Missing records are not an
    /// error.
    fn delete_record(&self, module_id: &str) -> Result<()>;

    /// Returns all lifecycle records keyed by module ID.
    fn list_records(&self) -> Result<BTreeMap<String, LifecycleRecord>>;

    /// Reads a process-wide integer setting. `None` when absent.
    fn setting(&self, key: &str) -> Result<Option<i64>>;

    /// Writes a process-wide integer setting.
    fn set_setting(&self, key: &str, value: i64) -> Result<()>;
}
