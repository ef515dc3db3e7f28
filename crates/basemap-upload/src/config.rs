use std::path::PathBuf;

use thiserror::Error;

use crate::driver::DEFAULT_BATCH_SIZE;
use crate::traversal::Categories;

/// Category subdirectories scanned when none are configured.
pub const DEFAULT_CATEGORIES: &[&str] = &["regions", "regions_buildings"];

/// Extension of the raster files to upload.
pub const DEFAULT_EXTENSION: &str = "tif";

pub const LEDGER_FILE: &str = "upload_history.db";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No basemaps directory configured (set BASEMAPS_DIR or pass --root)")]
    MissingRoot,

    #[error("No destination bucket configured (set BUCKET_NAME or pass --bucket)")]
    MissingBucket,

    #[error("Basemaps directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("At least one category must be configured")]
    NoCategories,

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

/// Unvalidated settings, as gathered from flags, environment and `.env`.
#[derive(Debug, Clone, Default)]
pub struct ConfigInput {
    pub root: Option<PathBuf>,
    pub bucket: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub categories: Vec<String>,
    pub extension: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical basemaps directory holding the category subdirectories.
    pub root: PathBuf,
    pub bucket: String,
    pub categories: Categories,
    pub state_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub batch_size: usize,
}

impl Config {
    /// Validate `input` and fill in defaults.
    pub fn resolve(input: ConfigInput) -> Result<Self, ConfigError> {
        let config = Self::resolve_local(input)?;
        if config.bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        Ok(config)
    }

    /// Like [`Config::resolve`], for commands that never reach the object
    /// store: the bucket is optional and left empty when not given.
    pub fn resolve_local(input: ConfigInput) -> Result<Self, ConfigError> {
        let root = input
            .root
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingRoot)?;
        let bucket = input
            .bucket
            .map(|b| b.trim().to_string())
            .unwrap_or_default();

        if !root.is_dir() {
            return Err(ConfigError::RootNotFound(root));
        }
        let root = root
            .canonicalize()
            .map_err(|_| ConfigError::RootNotFound(root.clone()))?;

        let categories = if input.categories.is_empty() {
            DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
        } else {
            input.categories
        };
        let categories = Categories::new(
            categories
                .into_iter()
                .map(|c| c.trim().trim_matches('/').to_string())
                .filter(|c| !c.is_empty()),
            input.extension.as_deref().unwrap_or(DEFAULT_EXTENSION),
        );
        if categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }

        let batch_size = input.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let state_dir = input.state_dir.unwrap_or_else(|| PathBuf::from("."));
        let ledger_path = input
            .ledger_path
            .unwrap_or_else(|| state_dir.join(LEDGER_FILE));

        Ok(Self {
            root,
            bucket,
            categories,
            state_dir,
            ledger_path,
            batch_size,
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir.join(CHECKPOINT_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.state_dir.join(PROGRESS_FILE)
    }
}
