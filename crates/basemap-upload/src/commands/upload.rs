//! Upload every file that is not yet in the ledger

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use tracing::{info, warn};

use basemap_upload::{
    BatchDriver, CheckpointStore, FsObjectStore, Ledger, ObjectStore, ProgressStore,
    S3ObjectStore, Traversal,
};

use super::{ConfigArgs, EXIT_INTERRUPTED};

/// Upload every file that is not yet in the ledger
#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Discard any saved checkpoint and progress and start from the first category
    #[arg(long)]
    fresh: bool,

    /// Copy into this local directory instead of S3 (one subdirectory per bucket)
    #[arg(long, value_name = "DIR")]
    local_store: Option<PathBuf>,

    /// S3-compatible endpoint URL (path-style addressing)
    #[arg(long, env = "S3_ENDPOINT_URL")]
    endpoint_url: Option<String>,
}

pub fn run(args: UploadArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = args.config.resolve()?;
    info!(root = ?config.root, bucket = %config.bucket, "Starting upload");

    fs::create_dir_all(&config.state_dir)?;
    let ledger = Ledger::open(&config.ledger_path)?;
    let checkpoints = CheckpointStore::new(config.checkpoint_path());
    let progress = ProgressStore::new(config.progress_path());

    if args.fresh {
        info!("Starting fresh, discarding saved checkpoint and progress");
        checkpoints.clear();
        progress.clear();
    } else if let Some(previous) = progress.load() {
        warn!(%previous, "Previous run did not finish, resuming");
    }

    let store: Box<dyn ObjectStore> = match &args.local_store {
        Some(dir) => {
            info!(?dir, "Using local directory store");
            Box::new(FsObjectStore::new(dir))
        }
        None => Box::new(S3ObjectStore::from_env(args.endpoint_url.as_deref())?),
    };

    let interrupt = install_interrupt_handler()?;

    let (summary, incomplete) = {
        let mut traversal = Traversal::new(&config.root, &config.categories, &ledger)
            .with_checkpoint(&checkpoints, !args.fresh);
        let summary = BatchDriver::new(store, &ledger, &progress, config.bucket.as_str())
            .batch_size(config.batch_size)
            .interrupt_flag(interrupt)
            .run(&mut traversal)?;
        (summary, traversal.had_errors())
    };

    let recorded = ledger.len()?;
    ledger.close()?;

    info!(?summary, "Upload complete");
    eprintln!("Upload complete");
    eprintln!("  Uploaded: {}", summary.uploaded);
    eprintln!("  Already in bucket: {}", summary.already_present);
    eprintln!("  Skipped (in ledger): {}", summary.skipped);
    eprintln!("  Batches: {}", summary.batches);
    eprintln!("  Ledger records: {}", recorded);
    if incomplete {
        eprintln!("Some categories or files could not be listed and were not uploaded, see the log");
    }

    Ok(())
}

/// The first interrupt asks the run to stop after the current file; a second
/// one exits immediately.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);

    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupted again, exiting now. Re-run to resume from saved progress.");
            std::process::exit(EXIT_INTERRUPTED);
        }
        eprintln!("Interrupt received, stopping after the current file (Ctrl+C again to stop now)");
    })?;

    Ok(flag)
}
