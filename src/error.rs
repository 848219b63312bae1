//! Top-level error type for the daemon entry points.

use crate::config::ConfigLoadError;
use crate::ledger::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FerryError {
    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),
    #[error("configuration rejected with {0} error(s); see log for details")]
    ConfigInvalid(usize),
    #[error("ledger store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("no ledger directory available on this platform")]
    NoLedgerDir,
}
