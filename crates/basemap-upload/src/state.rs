//! Small JSON state files (checkpoint, progress counters).

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid state file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Atomic write: serialize to a tempfile next to `path`, then rename over it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;

    let data = serde_json::to_vec_pretty(value).map_err(|source| StateError::Json {
        path: path.display().to_string(),
        source,
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StateError::io(path, e))?;
    temp.write_all(&data).map_err(|e| StateError::io(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StateError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

/// Read a JSON state file. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| StateError::Json {
            path: path.display().to_string(),
            source,
        })
}

/// Remove a state file; a file that is already gone is not an error.
pub fn remove_if_exists(path: &Path) -> Result<(), StateError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StateError::io(path, e)),
    }
}
