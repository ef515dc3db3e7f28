//! Show ledger totals and saved run state

use clap::Args;

use basemap_upload::{CheckpointStore, Ledger, ProgressStore};

use super::StateArgs;

/// Show ledger totals and any saved checkpoint or progress
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    state: StateArgs,
}

pub fn run(args: StatusArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ledger_path = args.state.ledger_path();

    if ledger_path.exists() {
        let ledger = Ledger::open_read_only(&ledger_path)?;
        println!("Ledger: {}", ledger_path.display());
        println!("  Records: {}", ledger.len()?);
        for (category, count) in ledger.category_counts()? {
            println!("  {}: {}", category, count);
        }
    } else {
        println!("Ledger: {} (not created yet)", ledger_path.display());
    }

    match CheckpointStore::new(args.state.checkpoint_path()).load() {
        Some(checkpoint) => println!(
            "Checkpoint: {}/{} (next run resumes here)",
            checkpoint.category, checkpoint.last_filename
        ),
        None => println!("Checkpoint: none"),
    }

    match ProgressStore::new(args.state.progress_path()).load() {
        Some(counters) => println!("Unfinished run: {}", counters),
        None => println!("Unfinished run: none"),
    }

    Ok(())
}
