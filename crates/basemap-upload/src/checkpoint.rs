//! Resume checkpoint.
//!
//! A single cursor naming the last file the traversal visited. It is written
//! before each file is evaluated and removed when a traversal completes.
//! Checkpointing is best-effort: failures are logged and swallowed, since losing
//! the checkpoint only costs a rescan while the ledger stays authoritative.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::state::{read_json, remove_if_exists, write_json_atomic};

/// Last visited position of a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub category: String,
    pub last_filename: String,
}

/// File-backed store for the single outstanding [`Checkpoint`].
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the checkpoint with `(category, filename)`.
    pub fn save(&self, category: &str, filename: &str) {
        let checkpoint = Checkpoint {
            category: category.to_string(),
            last_filename: filename.to_string(),
        };
        match write_json_atomic(&self.path, &checkpoint) {
            Ok(()) => trace!(category, filename, "Checkpoint saved"),
            Err(err) => warn!(path = ?self.path, %err, "Failed to save checkpoint"),
        }
    }

    /// The saved checkpoint, if any. An unreadable file is treated as absent.
    pub fn load(&self) -> Option<Checkpoint> {
        match read_json(&self.path) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                warn!(path = ?self.path, %err, "Ignoring unreadable checkpoint");
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(err) = remove_if_exists(&self.path) {
            warn!(path = ?self.path, %err, "Failed to remove checkpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().is_none());

        store.save("regions", "a.tif");
        store.save("regions", "b.tif");
        assert_eq!(
            store.load(),
            Some(Checkpoint {
                category: "regions".into(),
                last_filename: "b.tif".into(),
            })
        );

        store.clear();
        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_checkpoint_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        fs::write(store.path(), b"[1, 2").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoint.json"));

        store.save("regions", "a.tif");
        assert!(store.load().is_none());
        store.clear();
    }
}
