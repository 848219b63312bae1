//! Per-scan view of a filesystem entry.
//!
//! A `CandidateFile` is built fresh from metadata on every scan pass and
//! discarded afterwards; nothing in it is cached across scans.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Snapshot of a single file as observed by one scan pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// File name component
    pub file_name: String,
    /// Extension, lowercased, without the dot; `None` when the name has none
    pub extension: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Creation timestamp, when the filesystem reports one
    pub created: Option<DateTime<Utc>>,
    /// Last-modified timestamp
    pub modified: Option<DateTime<Utc>>,
    /// Last-accessed timestamp
    pub accessed: Option<DateTime<Utc>>,
}

impl CandidateFile {
    /// Build a candidate from a path by reading its metadata.
    ///
    /// Directories are not candidates; callers filter them out during
    /// enumeration. Timestamp fields the filesystem cannot provide are left
    /// as `None` rather than failing the whole candidate.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            extension,
            size: metadata.len(),
            created: metadata.created().ok().map(system_time_to_utc),
            modified: metadata.modified().ok().map(system_time_to_utc),
            accessed: metadata.accessed().ok().map(system_time_to_utc),
        })
    }
}

/// Convert a `SystemTime` to a UTC timestamp, tolerating pre-epoch times.
fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => Utc
            .timestamp_opt(d.as_secs() as i64, d.subsec_nanos())
            .single()
            .unwrap_or_else(Utc::now),
        Err(e) => {
            let back = e.duration();
            Utc.timestamp_opt(-(back.as_secs() as i64), 0)
                .single()
                .unwrap_or_else(Utc::now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_candidate_from_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("Report.PDF");
        fs::write(&file, b"hello").unwrap();

        let candidate = CandidateFile::from_path(&file).unwrap();
        assert_eq!(candidate.file_name, "Report.PDF");
        assert_eq!(candidate.extension.as_deref(), Some("pdf"));
        assert_eq!(candidate.size, 5);
        assert!(candidate.modified.is_some());
    }

    #[test]
    fn test_backdated_mtime_is_reported() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("archive.log");
        fs::write(&file, b"old news").unwrap();

        let three_hours_ago = Utc::now() - chrono::Duration::hours(3);
        filetime::set_file_mtime(
            &file,
            filetime::FileTime::from_unix_time(three_hours_ago.timestamp(), 0),
        )
        .unwrap();

        let candidate = CandidateFile::from_path(&file).unwrap();
        let modified = candidate.modified.unwrap();
        assert!((modified - three_hours_ago).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_candidate_without_extension() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("Makefile");
        fs::write(&file, b"all:").unwrap();

        let candidate = CandidateFile::from_path(&file).unwrap();
        assert_eq!(candidate.extension, None);
    }
}
