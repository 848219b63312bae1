//! Transfer ledger: outcome state machine, retry accounting, blacklist.
//!
//! Every attempted move is persisted before the move primitive runs; a file
//! that fails five times is blacklisted for the rest of the process lifetime.
//! The ledger is the only mutable state shared across concurrent rule scans
//! and owns the per-file-key single-writer discipline.
//!
//! ## Modules
//! - `store` - durable store contract plus SQLite and in-memory backends

pub mod store;

pub use store::{HistoryRow, LedgerStore, MemoryLedgerStore, SqliteLedgerStore, StoreError};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Attempts after which a file is blacklisted (the 5th failure is terminal).
pub const MAX_ATTEMPTS: u32 = 5;

/// Lifecycle of a single transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    InProgress,
    Success,
    Failed,
    Blacklisted,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::InProgress => "inProgress",
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
            TransferStatus::Blacklisted => "blacklisted",
        }
    }
}

/// Errors raised by ledger transitions.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The durable store refused the begin record. Fatal for the transfer:
    /// the move must not run, because the accountability invariant ("every
    /// attempted move has a durable record") is load-bearing.
    #[error("failed to persist transfer record for {file}: {source}")]
    Persistence {
        file: PathBuf,
        #[source]
        source: StoreError,
    },
    /// Another scan already owns an in-flight attempt for this file.
    #[error("transfer already in flight for {0}")]
    AlreadyInFlight(PathBuf),
    /// The file was blacklisted by earlier failures.
    #[error("{0} is blacklisted after repeated failures")]
    Blacklisted(PathBuf),
}

/// An accepted, persisted, in-flight transfer.
///
/// Mutated only by the owning scan; the per-file claim inside the ledger
/// guarantees at most one of these exists per file key at a time.
#[derive(Debug)]
pub struct TransferRecord {
    pub file_key: PathBuf,
    pub rule_name: String,
    pub persisted_id: i64,
    /// Failed attempts prior to this one.
    pub attempt_count: u32,
}

#[derive(Default)]
struct LedgerState {
    /// Failed-attempt counts for files still eligible for retry.
    attempts: HashMap<PathBuf, u32>,
    /// Files with an in-flight attempt; the single-writer claim set.
    in_flight: HashSet<PathBuf>,
    /// Terminal exclusions, held until process restart.
    blacklist: HashSet<PathBuf>,
}

/// Tracks in-flight, completed and blacklisted transfer attempts per file.
pub struct TransferLedger {
    store: Arc<dyn LedgerStore>,
    state: Mutex<LedgerState>,
}

impl TransferLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// O(1) blacklist probe, checked before any other eligibility work.
    pub fn is_blacklisted(&self, file_key: &Path) -> bool {
        self.state
            .lock()
            .map(|s| s.blacklist.contains(file_key))
            .unwrap_or(false)
    }

    /// Claim the file key and durably record an in-progress transfer.
    ///
    /// The claim is taken before the store call and released again if the
    /// store refuses, so two concurrent scans can never both begin the same
    /// file. A store failure blocks the move and surfaces loudly.
    pub fn begin(&self, file: &Path, rule: &str, size: u64) -> Result<TransferRecord, LedgerError> {
        let attempt_count = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.blacklist.contains(file) {
                return Err(LedgerError::Blacklisted(file.to_path_buf()));
            }
            if !state.in_flight.insert(file.to_path_buf()) {
                return Err(LedgerError::AlreadyInFlight(file.to_path_buf()));
            }
            state.attempts.get(file).copied().unwrap_or(0)
        };

        match self.store.record_begin(file, rule, size) {
            Ok(persisted_id) => Ok(TransferRecord {
                file_key: file.to_path_buf(),
                rule_name: rule.to_string(),
                persisted_id,
                attempt_count,
            }),
            Err(source) => {
                self.release(file);
                tracing::error!(
                    file = %file.display(),
                    rule,
                    error = %source,
                    "ledger store rejected transfer record; move blocked"
                );
                Err(LedgerError::Persistence {
                    file: file.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Terminal success: persist, clear retry tracking, release the claim.
    pub fn succeed(&self, record: TransferRecord) {
        if let Err(e) = self.store.update_status(
            record.persisted_id,
            TransferStatus::Success,
            None,
            record.attempt_count,
        ) {
            // The move already happened; history is best-effort from here.
            tracing::warn!(
                file = %record.file_key.display(),
                error = %e,
                "failed to persist success status"
            );
        }
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.attempts.remove(&record.file_key);
        state.in_flight.remove(&record.file_key);
    }

    /// Record a failed attempt; the 5th failure blacklists the file.
    ///
    /// Returns the resulting status (`Failed` keeps the file eligible for
    /// the next scan's natural retry, `Blacklisted` is terminal).
    pub fn fail(&self, record: TransferRecord, error: &str) -> TransferStatus {
        let attempts = record.attempt_count + 1;

        // Blacklisting is an in-memory terminal state; the durable record
        // keeps the plain Failed status with the final error.
        if let Err(e) = self.store.update_status(
            record.persisted_id,
            TransferStatus::Failed,
            Some(error),
            attempts,
        )
        {
            tracing::warn!(
                file = %record.file_key.display(),
                error = %e,
                "failed to persist failure status"
            );
        }

        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.in_flight.remove(&record.file_key);

        if attempts >= MAX_ATTEMPTS {
            state.attempts.remove(&record.file_key);
            state.blacklist.insert(record.file_key.clone());
            tracing::error!(
                file = %record.file_key.display(),
                attempts,
                error,
                "transfer blacklisted after repeated failures"
            );
            TransferStatus::Blacklisted
        } else {
            state.attempts.insert(record.file_key.clone(), attempts);
            tracing::warn!(
                file = %record.file_key.display(),
                attempts,
                error,
                "transfer failed; will retry on a later scan"
            );
            TransferStatus::Failed
        }
    }

    /// Whether an attempt is currently in flight for the file.
    pub fn is_in_flight(&self, file_key: &Path) -> bool {
        self.state
            .lock()
            .map(|s| s.in_flight.contains(file_key))
            .unwrap_or(false)
    }

    fn release(&self, file: &Path) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.in_flight.remove(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_memory() -> (TransferLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        (TransferLedger::new(store.clone()), store)
    }

    #[test]
    fn test_success_clears_tracking() {
        let (ledger, store) = ledger_with_memory();
        let file = Path::new("/watch/in/a.txt");

        let record = ledger.begin(file, "text", 10).unwrap();
        assert!(ledger.is_in_flight(file));
        ledger.succeed(record);

        assert!(!ledger.is_in_flight(file));
        assert!(!ledger.is_blacklisted(file));
        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, TransferStatus::Success);
    }

    #[test]
    fn test_fifth_failure_blacklists() {
        let (ledger, _store) = ledger_with_memory();
        let file = Path::new("/watch/in/b.txt");

        for attempt in 1..=4u32 {
            let record = ledger.begin(file, "text", 10).unwrap();
            let status = ledger.fail(record, "disk full");
            assert_eq!(status, TransferStatus::Failed, "attempt {attempt}");
            assert!(!ledger.is_blacklisted(file));
        }

        let record = ledger.begin(file, "text", 10).unwrap();
        assert_eq!(record.attempt_count, 4);
        let status = ledger.fail(record, "disk full");
        assert_eq!(status, TransferStatus::Blacklisted);
        assert!(ledger.is_blacklisted(file));

        // Terminal: further begins are refused.
        assert!(matches!(
            ledger.begin(file, "text", 10),
            Err(LedgerError::Blacklisted(_))
        ));
    }

    #[test]
    fn test_store_failure_blocks_begin() {
        let store = Arc::new(MemoryLedgerStore::failing());
        let ledger = TransferLedger::new(store.clone());
        let file = Path::new("/watch/in/c.txt");

        let result = ledger.begin(file, "text", 10);
        assert!(matches!(result, Err(LedgerError::Persistence { .. })));
        // The claim was released; a later scan may try again.
        assert!(!ledger.is_in_flight(file));
        assert_eq!(store.begin_count(), 0);
    }

    #[test]
    fn test_double_begin_is_refused() {
        let (ledger, _store) = ledger_with_memory();
        let file = Path::new("/watch/in/d.txt");

        let record = ledger.begin(file, "text", 10).unwrap();
        assert!(matches!(
            ledger.begin(file, "other", 10),
            Err(LedgerError::AlreadyInFlight(_))
        ));
        ledger.succeed(record);

        assert!(ledger.begin(file, "text", 10).is_ok());
    }
}
