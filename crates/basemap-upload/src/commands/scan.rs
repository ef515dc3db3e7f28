//! List files that still need uploading

use clap::Args;
use tracing::info;

use basemap_upload::{Ledger, Traversal};

use super::ConfigArgs;

/// List files that still need uploading, without reading or writing a checkpoint
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Only print the totals
    #[arg(long)]
    count: bool,
}

pub fn run(args: ScanArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = args.config.resolve_local()?;

    // Scanning must not create state, so a missing ledger means empty history.
    let ledger = if config.ledger_path.exists() {
        Ledger::open_read_only(&config.ledger_path)?
    } else {
        info!(ledger = ?config.ledger_path, "No ledger yet, treating history as empty");
        Ledger::open_in_memory()?
    };

    let mut traversal = Traversal::new(&config.root, &config.categories, &ledger);
    let mut pending = 0u64;
    let mut skipped = 0u64;

    for candidate in traversal.by_ref() {
        pending += 1;
        skipped += candidate.skipped;
        if !args.count {
            println!("{}\t{}", candidate.category, candidate.path.display());
        }
    }
    skipped += traversal.trailing_skipped();

    if traversal.had_errors() {
        eprintln!("Some categories or files could not be listed, see the log");
    }

    eprintln!(
        "{} files found, {} to upload, {} already uploaded",
        pending + skipped,
        pending,
        skipped
    );

    Ok(())
}
