//! Logical identity of an uploadable file.
//!
//! A file is identified by its category and base name only, not by its full
//! source path: two files called `x.tif` in `regions/` are the same logical file
//! even when found under different roots. The same string is used as the object
//! key in the remote bucket.

use std::fmt;
use std::path::Path;

/// `category/basename`, the unit of upload identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey(String);

impl FileKey {
    /// Build the key for a file discovered under `category`.
    pub fn new(source_path: &Path, category: &str) -> Self {
        let basename = source_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| source_path.to_string_lossy());
        Self(format!("{}/{}", category.trim_end_matches('/'), basename))
    }

    /// Parse a key read from elsewhere (e.g. a legacy history file).
    ///
    /// Returns `None` unless the key has a non-empty category and a non-empty
    /// base name separated by a single `/`.
    pub fn parse(s: &str) -> Option<Self> {
        let (category, basename) = s.split_once('/')?;
        if category.is_empty() || basename.is_empty() || basename.contains('/') {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The category half of the key.
    pub fn category(&self) -> &str {
        self.0.split_once('/').map(|(c, _)| c).unwrap_or_default()
    }
}

impl AsRef<str> for FileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
