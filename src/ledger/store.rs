//! Durable ledger store contract and the SQLite-backed default.
//!
//! The core only needs record/update/query against whatever engine persists
//! transfer history; `SqliteLedgerStore` is the bundled default, but tests
//! and embedders can supply anything implementing `LedgerStore`.

use super::TransferStatus;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Failure reported by a ledger store operation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError(err.to_string())
    }
}

/// Narrow contract against the durable transfer-history engine.
///
/// The core never assumes success: a failed `record_begin` is fatal for that
/// transfer and blocks the move.
pub trait LedgerStore: Send + Sync {
    /// Durably record a transfer about to start; returns the record handle.
    fn record_begin(&self, file: &Path, rule: &str, size: u64) -> Result<i64, StoreError>;

    /// Update a previously recorded transfer.
    fn update_status(
        &self,
        record_id: i64,
        status: TransferStatus,
        error: Option<&str>,
        attempt_count: u32,
    ) -> Result<(), StoreError>;
}

/// One row of persisted transfer history.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub file_path: String,
    pub rule_name: String,
    pub size: u64,
    pub status: String,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// SQLite-backed ledger store.
pub struct SqliteLedgerStore {
    db_path: PathBuf,
}

impl SqliteLedgerStore {
    /// Open or create the ledger database under `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError(format!("failed to create ledger directory: {e}")))?;

        let db_path = dir.join("transfers.db");
        let conn = Self::connect(&db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transfers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                rule_name TEXT NOT NULL,
                size INTEGER NOT NULL,
                status TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_file ON transfers(file_path);
            CREATE INDEX IF NOT EXISTS idx_transfers_status ON transfers(status);
            "#,
        )?;

        Ok(Self { db_path })
    }

    fn connect(path: &Path) -> Result<rusqlite::Connection, StoreError> {
        Ok(rusqlite::Connection::open(path)?)
    }

    fn conn(&self) -> Result<rusqlite::Connection, StoreError> {
        Self::connect(&self.db_path)
    }

    /// Most recent transfer rows, newest first. Supports the external UI's
    /// history view; the core itself never reads this back.
    pub fn history(&self, limit: u32) -> Result<Vec<HistoryRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, rule_name, size, status, attempt_count, last_error
             FROM transfers ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok(HistoryRow {
                    id: row.get(0)?,
                    file_path: row.get(1)?,
                    rule_name: row.get(2)?,
                    size: row.get::<_, i64>(3)? as u64,
                    status: row.get(4)?,
                    attempt_count: row.get::<_, i64>(5)? as u32,
                    last_error: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn record_begin(&self, file: &Path, rule: &str, size: u64) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transfers (file_path, rule_name, size, status, attempt_count, started_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            rusqlite::params![
                file.to_string_lossy(),
                rule,
                size as i64,
                TransferStatus::InProgress.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_status(
        &self,
        record_id: i64,
        status: TransferStatus,
        error: Option<&str>,
        attempt_count: u32,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let finished_at = match status {
            TransferStatus::InProgress => None,
            _ => Some(Utc::now().to_rfc3339()),
        };
        let updated = conn.execute(
            "UPDATE transfers
             SET status = ?1, last_error = ?2, attempt_count = ?3, finished_at = ?4
             WHERE id = ?5",
            rusqlite::params![status.as_str(), error, attempt_count as i64, finished_at, record_id],
        )?;
        if updated == 0 {
            return Err(StoreError(format!("no transfer record with id {record_id}")));
        }
        Ok(())
    }
}

/// In-memory store used by tests and embedders that keep history elsewhere.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryInner>,
    /// When set, `record_begin` fails; exercises the accountability path.
    pub fail_begin: bool,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    updates: Vec<(i64, TransferStatus, Option<String>, u32)>,
    begins: Vec<(PathBuf, String, u64)>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            inner: Mutex::default(),
            fail_begin: true,
        }
    }

    /// Number of `record_begin` calls observed.
    pub fn begin_count(&self) -> usize {
        self.inner.lock().map(|i| i.begins.len()).unwrap_or(0)
    }

    /// All status updates observed, in order.
    pub fn updates(&self) -> Vec<(i64, TransferStatus, Option<String>, u32)> {
        self.inner.lock().map(|i| i.updates.clone()).unwrap_or_default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn record_begin(&self, file: &Path, rule: &str, size: u64) -> Result<i64, StoreError> {
        if self.fail_begin {
            return Err(StoreError("ledger store unavailable".to_string()));
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError("memory store poisoned".to_string()))?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.begins.push((file.to_path_buf(), rule.to_string(), size));
        Ok(id)
    }

    fn update_status(
        &self,
        record_id: i64,
        status: TransferStatus,
        error: Option<&str>,
        attempt_count: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError("memory store poisoned".to_string()))?;
        inner
            .updates
            .push((record_id, status, error.map(String::from), attempt_count));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = SqliteLedgerStore::open(temp.path()).unwrap();

        let id = store
            .record_begin(Path::new("/watch/in/a.txt"), "text", 42)
            .unwrap();
        store
            .update_status(id, TransferStatus::Success, None, 0)
            .unwrap();

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file_path, "/watch/in/a.txt");
        assert_eq!(history[0].status, "success");
        assert_eq!(history[0].size, 42);
    }

    #[test]
    fn test_sqlite_update_unknown_id_fails() {
        let temp = TempDir::new().unwrap();
        let store = SqliteLedgerStore::open(temp.path()).unwrap();

        let result = store.update_status(999, TransferStatus::Failed, Some("boom"), 1);
        assert!(result.is_err());
    }
}
