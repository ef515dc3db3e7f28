//! basemap-upload - Resumable, idempotent upload of basemap tiles to an object store.
//!
//! This library walks a fixed set of category directories for raster files, uploads
//! each one exactly once, and records completed uploads in a SQLite ledger so that
//! repeated or interrupted runs pick up where they left off.

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod history;
pub mod key;
pub mod ledger;
pub mod progress;
pub mod state;
pub mod store;
pub mod traversal;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{Config, ConfigError, ConfigInput, DEFAULT_CATEGORIES, DEFAULT_EXTENSION};
pub use driver::{BatchDriver, DEFAULT_BATCH_SIZE, RunError, RunSummary};
pub use history::{
    HistoryError, ImportReport, VerifyReport, import_json_history, verify_json_history,
};
pub use key::FileKey;
pub use ledger::{Ledger, LedgerError, UploadRecord};
pub use progress::{ProgressCounters, ProgressStore};
pub use state::StateError;
pub use store::{FsObjectStore, ObjectStore, PutOutcome, S3ObjectStore, StoreError};
pub use traversal::{Candidate, Categories, Traversal};
