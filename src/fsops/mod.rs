//! The move primitive.
//!
//! The engine only ever asks for "move this file there, overwriting or
//! not"; everything else (what to move, when, whether it is safe) is decided
//! upstream. The default mover renames within a volume and falls back to
//! copy-then-delete across volumes, syncing the copy before the source is
//! removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Move failures, retryable by the ledger's attempt accounting.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("destination folder could not be created: {0}")]
    CreateDestination(#[source] io::Error),
    #[error("rename failed: {0}")]
    Rename(#[source] io::Error),
    #[error("copy fallback failed: {0}")]
    Copy(#[source] io::Error),
    #[error("source could not be removed after copy: {0}")]
    RemoveSource(#[source] io::Error),
}

/// What the mover did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The file now lives at the destination path
    Moved(PathBuf),
    /// The destination already existed and the policy said skip
    SkippedExisting(PathBuf),
}

/// Contract the engine holds against the move implementation.
pub trait FileMover: Send + Sync {
    fn move_file(&self, src: &Path, dst_dir: &Path, overwrite: bool)
        -> Result<MoveOutcome, MoveError>;
}

/// Default mover: atomic rename with a cross-device copy-then-delete
/// fallback.
pub struct AtomicMover;

impl FileMover for AtomicMover {
    fn move_file(
        &self,
        src: &Path,
        dst_dir: &Path,
        overwrite: bool,
    ) -> Result<MoveOutcome, MoveError> {
        fs::create_dir_all(dst_dir).map_err(MoveError::CreateDestination)?;

        let file_name = src.file_name().unwrap_or_default();
        let dst = dst_dir.join(file_name);

        if dst.exists() && !overwrite {
            return Ok(MoveOutcome::SkippedExisting(dst));
        }

        match fs::rename(src, &dst) {
            Ok(()) => Ok(MoveOutcome::Moved(dst)),
            Err(e) if is_cross_device(&e) => copy_then_delete(src, &dst),
            Err(e) => Err(MoveError::Rename(e)),
        }
    }
}

/// Cross-volume renames fail with EXDEV on Unix and
/// ERROR_NOT_SAME_DEVICE on Windows.
fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18)
    }
    #[cfg(not(unix))]
    {
        err.raw_os_error() == Some(17)
    }
}

fn copy_then_delete(src: &Path, dst: &Path) -> Result<MoveOutcome, MoveError> {
    fs::copy(src, dst).map_err(MoveError::Copy)?;

    // The copy must be durable before the only other copy disappears.
    let copied = fs::File::open(dst).map_err(MoveError::Copy)?;
    copied.sync_all().map_err(MoveError::Copy)?;
    drop(copied);

    fs::remove_file(src).map_err(MoveError::RemoveSource)?;
    Ok(MoveOutcome::Moved(dst.to_path_buf()))
}

/// Test double that records every call and answers from a script.
pub struct RecordingMover {
    calls: std::sync::Mutex<Vec<(PathBuf, PathBuf, bool)>>,
    fail_times: std::sync::atomic::AtomicU32,
}

impl RecordingMover {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail_times: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Fail the next `n` calls with a rename error, then succeed.
    pub fn failing_times(n: u32) -> Self {
        let mover = Self::new();
        mover.fail_times.store(n, std::sync::atomic::Ordering::SeqCst);
        mover
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, bool)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for RecordingMover {
    fn default() -> Self {
        Self::new()
    }
}

impl FileMover for RecordingMover {
    fn move_file(
        &self,
        src: &Path,
        dst_dir: &Path,
        overwrite: bool,
    ) -> Result<MoveOutcome, MoveError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((src.to_path_buf(), dst_dir.to_path_buf(), overwrite));
        }
        let remaining = self.fail_times.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times
                .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(MoveError::Rename(io::Error::new(
                io::ErrorKind::Other,
                "scripted failure",
            )));
        }
        Ok(MoveOutcome::Moved(
            dst_dir.join(src.file_name().unwrap_or_default()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_within_volume() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst_dir = temp.path().join("out");
        fs::write(&src, b"payload").unwrap();

        let outcome = AtomicMover.move_file(&src, &dst_dir, false).unwrap();
        assert_eq!(outcome, MoveOutcome::Moved(dst_dir.join("a.txt")));
        assert!(!src.exists());
        assert_eq!(fs::read(dst_dir.join("a.txt")).unwrap(), b"payload");
    }

    #[test]
    fn test_collision_skip_leaves_both() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst_dir = temp.path().join("out");
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(&src, b"new").unwrap();
        fs::write(dst_dir.join("a.txt"), b"old").unwrap();

        let outcome = AtomicMover.move_file(&src, &dst_dir, false).unwrap();
        assert_eq!(outcome, MoveOutcome::SkippedExisting(dst_dir.join("a.txt")));
        assert!(src.exists());
        assert_eq!(fs::read(dst_dir.join("a.txt")).unwrap(), b"old");
    }

    #[test]
    fn test_collision_overwrite_replaces() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst_dir = temp.path().join("out");
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(&src, b"new").unwrap();
        fs::write(dst_dir.join("a.txt"), b"old").unwrap();

        let outcome = AtomicMover.move_file(&src, &dst_dir, true).unwrap();
        assert_eq!(outcome, MoveOutcome::Moved(dst_dir.join("a.txt")));
        assert!(!src.exists());
        assert_eq!(fs::read(dst_dir.join("a.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("gone.txt");
        let dst_dir = temp.path().join("out");

        let result = AtomicMover.move_file(&src, &dst_dir, false);
        assert!(matches!(result, Err(MoveError::Rename(_))));
    }
}
