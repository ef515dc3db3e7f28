use std::path::PathBuf;

use clap::Args;

use basemap_upload::config::{CHECKPOINT_FILE, LEDGER_FILE, PROGRESS_FILE};
use basemap_upload::{Config, ConfigError, ConfigInput};

pub mod history;
pub mod scan;
pub mod status;
pub mod upload;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Where run state lives
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Directory for the ledger, checkpoint and progress files
    #[arg(long, env = "UPLOAD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Ledger database path (defaults to <STATE_DIR>/upload_history.db)
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

impl StateArgs {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.state_dir().join(LEDGER_FILE))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join(CHECKPOINT_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.state_dir().join(PROGRESS_FILE)
    }
}

/// Source directory, destination and traversal settings
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Basemaps directory containing the category subdirectories
    #[arg(long, env = "BASEMAPS_DIR")]
    pub root: Option<PathBuf>,

    /// Destination bucket
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket: Option<String>,

    /// Category subdirectory to scan, in order (repeatable; defaults to regions, regions_buildings)
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,

    /// Extension of the files to upload (default: tif)
    #[arg(long)]
    pub extension: Option<String>,

    /// Number of files per progress batch (default: 100)
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[command(flatten)]
    pub state: StateArgs,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        Config::resolve(self.input())
    }

    /// Settings for commands that do not upload, so need no bucket.
    pub fn resolve_local(&self) -> Result<Config, ConfigError> {
        Config::resolve_local(self.input())
    }

    fn input(&self) -> ConfigInput {
        ConfigInput {
            root: self.root.clone(),
            bucket: self.bucket.clone(),
            state_dir: self.state.state_dir.clone(),
            ledger_path: self.state.ledger.clone(),
            categories: self.categories.clone(),
            extension: self.extension.clone(),
            batch_size: self.batch_size,
        }
    }
}
