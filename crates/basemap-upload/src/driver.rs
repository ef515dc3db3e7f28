//! Batch driver: uploads traversal output and records completions.
//!
//! Any upload or ledger failure stops the run immediately. The traversal has
//! already checkpointed the failing file, so the next run starts with it.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::key::FileKey;
use crate::ledger::{Ledger, LedgerError};
use crate::progress::{ProgressCounters, ProgressStore};
use crate::store::{ObjectStore, PutOutcome, StoreError};
use crate::traversal::{Candidate, Traversal};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to upload {path:?} (category {category}): {source}")]
    Upload {
        path: PathBuf,
        category: String,
        #[source]
        source: StoreError,
    },

    #[error("Uploaded {path:?} (category {category}) but could not record it in the ledger: {source}")]
    Ledger {
        path: PathBuf,
        category: String,
        #[source]
        source: LedgerError,
    },

    #[error("Interrupted after {counters}")]
    Interrupted { counters: ProgressCounters },
}

/// Totals for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files whose bytes were transferred.
    pub uploaded: u64,
    /// Files the store already held; recorded without transfer.
    pub already_present: u64,
    /// Files skipped because the ledger already had them.
    pub skipped: u64,
    pub batches: u64,
}

impl RunSummary {
    pub fn successful(&self) -> u64 {
        self.uploaded + self.already_present
    }
}

pub struct BatchDriver<'a, S: ObjectStore> {
    store: S,
    ledger: &'a Ledger,
    progress: &'a ProgressStore,
    bucket: String,
    batch_size: usize,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a, S: ObjectStore> BatchDriver<'a, S> {
    pub fn new(
        store: S,
        ledger: &'a Ledger,
        progress: &'a ProgressStore,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            progress,
            bucket: bucket.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            interrupt: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stop cleanly before the next file once `flag` is set.
    pub fn interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Upload everything `traversal` yields.
    ///
    /// Files are pulled from the traversal one at a time, so the checkpoint
    /// never runs ahead of the file being uploaded; batches only group the
    /// progress reporting. Counters are persisted after every file, carrying on
    /// from those a previous unfinished run left behind.
    pub fn run(&self, traversal: &mut Traversal<'_>) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();
        let mut counters = self.progress.load().unwrap_or_default();
        if counters != ProgressCounters::default() {
            debug!(%counters, "Continuing counters of the previous run");
        }
        let mut in_batch = 0;

        loop {
            if self.interrupted() {
                info!(%counters, "Interrupted, stopping before the next file");
                return Err(RunError::Interrupted { counters });
            }

            let Some(candidate) = traversal.next() else {
                break;
            };

            if in_batch == 0 {
                summary.batches += 1;
                debug!(batch = summary.batches, "Starting batch");
            }

            summary.skipped += candidate.skipped;
            counters.skipped_count += candidate.skipped;

            match self.process(&candidate)? {
                PutOutcome::Uploaded => summary.uploaded += 1,
                PutOutcome::AlreadyExists => summary.already_present += 1,
            }
            counters.successful_count += 1;
            self.progress.save(&counters);

            in_batch += 1;
            if in_batch == self.batch_size {
                info!(batch = summary.batches, %counters, "Batch complete");
                in_batch = 0;
            }
        }

        let trailing = traversal.trailing_skipped();
        summary.skipped += trailing;
        counters.skipped_count += trailing;

        if in_batch > 0 {
            info!(batch = summary.batches, %counters, "Batch complete");
        }

        self.progress.clear();
        Ok(summary)
    }

    fn process(&self, candidate: &Candidate) -> Result<PutOutcome, RunError> {
        let Candidate { path, category, .. } = candidate;
        let key = FileKey::new(path, category);

        info!(?path, bucket = %self.bucket, %key, "Uploading");
        let outcome = self
            .store
            .put(path, &self.bucket, key.as_str())
            .map_err(|source| {
                error!(?path, %category, %source, "Upload failed");
                RunError::Upload {
                    path: path.clone(),
                    category: category.clone(),
                    source,
                }
            })?;

        if outcome == PutOutcome::AlreadyExists {
            info!(%key, "Already present in bucket, recording it");
        }

        self.ledger
            .mark_uploaded(path, category)
            .map_err(|source| {
                error!(?path, %category, %source, "Failed to record upload");
                RunError::Ledger {
                    path: path.clone(),
                    category: category.clone(),
                    source,
                }
            })?;

        Ok(outcome)
    }
}
