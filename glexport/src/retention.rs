//! Retention pruning of expired backup archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::Result;

/// Only entries with this suffix are considered backups; anything else in
/// the destination directory is left alone.
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Delete backups in `dir` strictly older than `max_age_days`.
///
/// Age is computed from filesystem modification time, not from the name
/// (name formats are user-configurable and not guaranteed parseable).
/// Entries exactly at the boundary are retained. A failed deletion is
/// logged and skipped; the rest of the directory is still processed.
/// Returns the paths actually deleted.
pub fn prune(dir: &Path, max_age_days: f64) -> Result<Vec<PathBuf>> {
    prune_as_of(dir, max_age_days, SystemTime::now())
}

/// [`prune`] with an explicit reference time.
pub fn prune_as_of(dir: &Path, max_age_days: f64, now: SystemTime) -> Result<Vec<PathBuf>> {
    let max_age = Duration::from_secs_f64(max_age_days * 86_400.0);
    let mut deleted = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "unreadable directory entry, skipping");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !entry.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read mtime, skipping");
                continue;
            }
        };

        // Future mtimes (clock skew) count as age zero.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted expired backup");
                deleted.push(path);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot delete expired backup");
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(86_400);

    fn touch(dir: &Path, name: &str) -> (PathBuf, SystemTime) {
        let path = dir.join(name);
        fs::write(&path, b"archive").unwrap();
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();
        (path, mtime)
    }

    #[test]
    fn test_deletes_strictly_older_entries() {
        let temp = TempDir::new().unwrap();
        let (path, mtime) = touch(temp.path(), "backup.tar.gz");

        let deleted = prune_as_of(temp.path(), 3.0, mtime + 4 * DAY).unwrap();
        assert_eq!(deleted, vec![path.clone()]);
        assert!(!path.exists());
    }

    #[test]
    fn test_retains_entry_exactly_at_boundary() {
        let temp = TempDir::new().unwrap();
        let (path, mtime) = touch(temp.path(), "backup.tar.gz");

        let deleted = prune_as_of(temp.path(), 3.0, mtime + 3 * DAY).unwrap();
        assert!(deleted.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_retains_newer_entries() {
        let temp = TempDir::new().unwrap();
        let (path, mtime) = touch(temp.path(), "backup.tar.gz");

        let deleted = prune_as_of(temp.path(), 3.0, mtime + DAY).unwrap();
        assert!(deleted.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let temp = TempDir::new().unwrap();
        let (notes, mtime) = touch(temp.path(), "notes.txt");
        touch(temp.path(), "config.yaml");

        let deleted = prune_as_of(temp.path(), 1.0, mtime + 10 * DAY).unwrap();
        assert!(deleted.is_empty());
        assert!(notes.exists());
    }

    #[test]
    fn test_ignores_directories() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("old.tar.gz");
        fs::create_dir(&subdir).unwrap();
        let mtime = fs::metadata(&subdir).unwrap().modified().unwrap();

        let deleted = prune_as_of(temp.path(), 1.0, mtime + 10 * DAY).unwrap();
        assert!(deleted.is_empty());
        assert!(subdir.exists());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(prune_as_of(&missing, 1.0, SystemTime::now()).is_err());
    }
}
