use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot read local file {path:?}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Object store error for {bucket}/{key}: {message}")]
    Remote {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a successful put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The bytes were transferred.
    Uploaded,
    /// The store already held an object under the key; nothing was sent.
    AlreadyExists,
}
