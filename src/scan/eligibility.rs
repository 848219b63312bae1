//! Per-file eligibility gate.
//!
//! Decides whether an individual file may be considered at all this scan.
//! The gate is stateless: a file that was locked becomes eligible the
//! instant a later scan observes it unlocked, with no debounce.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

/// Why a file was excluded from consideration this scan.
///
/// All reasons are transient; none is ever escalated to a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IneligibleReason {
    /// Zero-length file, likely still being written
    Empty,
    /// Another process holds the file open; the exclusive probe failed
    Locked,
    /// The file could not be opened for any other reason
    Inaccessible,
}

/// Outcome of the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Stateless eligibility gate.
pub struct EligibilityGate;

impl EligibilityGate {
    /// Check whether `path` may be considered for matching this scan.
    ///
    /// Order matters: the size check runs first so zero-length files never
    /// pay for a lock probe. The probe opens the file and takes an exclusive
    /// lock with zero sharing; the handle is dropped immediately on success
    /// so the gate never holds the file itself.
    pub fn check(path: &Path) -> Eligibility {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return Eligibility::Ineligible(IneligibleReason::Inaccessible),
        };

        if metadata.len() == 0 {
            return Eligibility::Ineligible(IneligibleReason::Empty);
        }

        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(_) => return Eligibility::Ineligible(IneligibleReason::Inaccessible),
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                // Probe succeeded; release immediately.
                let _ = FileExt::unlock(&file);
                Eligibility::Eligible
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Eligibility::Ineligible(IneligibleReason::Locked)
            }
            Err(_) => Eligibility::Ineligible(IneligibleReason::Inaccessible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_is_ineligible() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("report.pdf");
        fs::write(&file, b"").unwrap();

        assert_eq!(
            EligibilityGate::check(&file),
            Eligibility::Ineligible(IneligibleReason::Empty)
        );
    }

    #[test]
    fn test_missing_file_is_inaccessible() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("gone.txt");

        assert_eq!(
            EligibilityGate::check(&file),
            Eligibility::Ineligible(IneligibleReason::Inaccessible)
        );
    }

    #[test]
    fn test_normal_file_is_eligible() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("log.txt");
        fs::write(&file, b"content").unwrap();

        assert_eq!(EligibilityGate::check(&file), Eligibility::Eligible);
    }

    #[test]
    fn test_locked_file_becomes_eligible_after_release() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("held.txt");
        fs::write(&file, b"content").unwrap();

        let holder = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&file)
            .unwrap();
        holder.lock_exclusive().unwrap();

        assert_eq!(
            EligibilityGate::check(&file),
            Eligibility::Ineligible(IneligibleReason::Locked)
        );

        FileExt::unlock(&holder).unwrap();
        drop(holder);

        // No cache: the very next check sees the file as eligible.
        assert_eq!(EligibilityGate::check(&file), Eligibility::Eligible);
    }
}
