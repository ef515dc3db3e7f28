use std::path::Path;

mod fs;
mod s3;
mod types;

pub use fs::FsObjectStore;
pub use s3::S3ObjectStore;
pub use types::{PutOutcome, StoreError};

/// Destination for uploads.
///
/// Implementations own their network timeout and retry policy. They must only
/// report [`PutOutcome::AlreadyExists`] when the store positively confirms the
/// object is present; any other failure to check is an error.
pub trait ObjectStore {
    /// Upload the file at `local_path` to `bucket` under `key`.
    fn put(&self, local_path: &Path, bucket: &str, key: &str) -> Result<PutOutcome, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn put(&self, local_path: &Path, bucket: &str, key: &str) -> Result<PutOutcome, StoreError> {
        (**self).put(local_path, bucket, key)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn put(&self, local_path: &Path, bucket: &str, key: &str) -> Result<PutOutcome, StoreError> {
        (**self).put(local_path, bucket, key)
    }
}
