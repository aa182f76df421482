//! SQLite-backed state store.
//!
//! One database file (`herald.db`) holds both namespaces. Thread-safe via an
//! internal `Mutex<Connection>`: all access is serialized, which also gives
//! per-module write atomicity. WAL mode keeps the scan tick and user-action
//! callbacks from blocking each other on the SQLite side.

use super::StateStore;
use crate::error::{HeraldError, Result};
use crate::lifecycle::LifecycleRecord;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Database filename within the state directory.
const DB_FILENAME: &str = "herald.db";

/// SQLite-backed implementation of [`StateStore`].
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `{state_dir}/herald.db` and applies
    /// the schema.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Store`] if the directory cannot be created or the
    /// database cannot be opened.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .map_err(|e| HeraldError::Store(format!("cannot create state dir: {e}")))?;
        let path = state_dir.join(DB_FILENAME);
        let conn = Connection::open(&path)
            .map_err(|e| HeraldError::Store(format!("cannot open {}: {e}", path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(store_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS module_state (
                 id     TEXT PRIMARY KEY,
                 record TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS process_settings (
                 key   TEXT PRIMARY KEY,
                 value INTEGER NOT NULL
             );",
        )
        .map_err(store_err)?;

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HeraldError::Store("state store mutex poisoned".to_owned()))
    }
}

impl StateStore for SqliteStore {
    fn get_record(&self, module_id: &str) -> Result<Option<LifecycleRecord>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT record FROM module_state WHERE id = ?1",
                params![module_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;

        Ok(raw.and_then(|json| decode_record(module_id, &json)))
    }

    fn put_record(&self, module_id: &str, record: &LifecycleRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| HeraldError::Store(format!("cannot serialize record: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO module_state (id, record) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            params![module_id, json],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn delete_record(&self, module_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM module_state WHERE id = ?1", params![module_id])
            .map_err(store_err)?;
        Ok(())
    }

    fn list_records(&self) -> Result<BTreeMap<String, LifecycleRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, record FROM module_state ORDER BY id")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err)?;

        let mut records = BTreeMap::new();
        for row in rows {
            let (id, json) = row.map_err(store_err)?;
            if let Some(record) = decode_record(&id, &json) {
                records.insert(id, record);
            }
        }
        Ok(records)
    }

    fn setting(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM process_settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)
    }

    fn set_setting(&self, key: &str, value: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO process_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

/// Corrupt record JSON reads as absent. The engine treats the module as new,
/// which is the safe direction (at-least-once display).
fn decode_record(module_id: &str, json: &str) -> Option<LifecycleRecord> {
    match serde_json::from_str(json) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(module = %module_id, "discarding corrupt lifecycle record: {e}");
            None
        }
    }
}

fn store_err(e: rusqlite::Error) -> HeraldError {
    HeraldError::Store(e.to_string())
}

// ── Tests ────────────────────────────────────────────────────────────────────
