use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ObjectStore, PutOutcome, StoreError};

/// Object store backed by a local directory: each bucket is a subdirectory of
/// the base path and each key a relative file path inside it.
pub struct FsObjectStore {
    base_path: PathBuf,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Path an object is stored at.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.base_path.join(bucket);
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Atomic copy: stream into a tempfile beside the target, then rename.
    fn atomic_copy(&self, source: &Path, target: &Path) -> Result<(), StoreError> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "object path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let input = File::open(source).map_err(|e| StoreError::LocalFile {
            path: source.to_path_buf(),
            source: e,
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        io::copy(&mut BufReader::new(input), &mut temp).map_err(|e| StoreError::LocalFile {
            path: source.to_path_buf(),
            source: e,
        })?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, local_path: &Path, bucket: &str, key: &str) -> Result<PutOutcome, StoreError> {
        let target = self.object_path(bucket, key);

        if target.try_exists()? {
            debug!(?target, "Object already present");
            return Ok(PutOutcome::AlreadyExists);
        }

        self.atomic_copy(local_path, &target)?;
        debug!(?local_path, ?target, "Object stored");
        Ok(PutOutcome::Uploaded)
    }
}
