//! Progress counters for crash reporting.
//!
//! Written after every processed item and removed after a fully successful run.
//! The counters are advisory only; the ledger decides what was uploaded.

use std::fmt;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::{read_json, remove_if_exists, write_json_atomic};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub successful_count: u64,
    pub skipped_count: u64,
    /// Unix milliseconds of the last update.
    #[serde(default)]
    pub updated_at: i64,
}

impl fmt::Display for ProgressCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped",
            self.successful_count, self.skipped_count
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `counters`, stamping them with the current time.
    pub fn save(&self, counters: &ProgressCounters) {
        let stamped = ProgressCounters {
            updated_at: Timestamp::now().as_millisecond(),
            ..*counters
        };
        if let Err(err) = write_json_atomic(&self.path, &stamped) {
            warn!(path = ?self.path, %err, "Failed to save progress counters");
        }
    }

    pub fn load(&self) -> Option<ProgressCounters> {
        match read_json(&self.path) {
            Ok(counters) => counters,
            Err(err) => {
                warn!(path = ?self.path, %err, "Ignoring unreadable progress counters");
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(err) = remove_if_exists(&self.path) {
            warn!(path = ?self.path, %err, "Failed to remove progress counters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));

        store.save(&ProgressCounters {
            successful_count: 7,
            skipped_count: 3,
            updated_at: 0,
        });

        let loaded = store.load().unwrap();
        assert_eq!(loaded.successful_count, 7);
        assert_eq!(loaded.skipped_count, 3);
        assert!(loaded.updated_at > 0);
        assert_eq!(loaded.to_string(), "7 uploaded, 3 skipped");

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_timestamp_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        std::fs::write(
            store.path(),
            br#"{"successful_count": 2, "skipped_count": 1}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.successful_count, 2);
        assert_eq!(loaded.updated_at, 0);
    }
}
