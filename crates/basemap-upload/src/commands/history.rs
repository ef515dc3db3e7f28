//! Legacy JSON history import and verification

use std::fs;
use std::path::PathBuf;

use clap::Args;
use tracing::info;

use basemap_upload::{Ledger, import_json_history, verify_json_history};

use super::StateArgs;

/// How many keys to list per side when reporting differences.
const SAMPLE: usize = 5;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Legacy history file
    #[arg(default_value = "upload_history.json")]
    file: PathBuf,

    #[command(flatten)]
    state: StateArgs,
}

pub fn import(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fs::create_dir_all(args.state.state_dir())?;
    let ledger_path = args.state.ledger_path();
    let ledger = Ledger::open(&ledger_path)?;

    info!(file = ?args.file, ledger = ?ledger_path, "Importing history");
    let report = import_json_history(&ledger, &args.file)?;
    let total = ledger.len()?;
    ledger.close()?;

    eprintln!("Imported {} of {} records", report.imported, report.total);
    if report.invalid > 0 {
        eprintln!("  Skipped {} invalid records (see log)", report.invalid);
    }
    eprintln!("  Ledger now holds {} records", total);
    Ok(())
}

pub fn verify(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ledger = Ledger::open_read_only(&args.state.ledger_path())?;
    let report = verify_json_history(&ledger, &args.file)?;

    println!("Records in history file: {}", report.history_count);
    println!("Records in ledger: {}", report.ledger_count);

    if !report.extra_in_ledger.is_empty() {
        println!(
            "{} ledger records are not in the history file, e.g. {:?}",
            report.extra_in_ledger.len(),
            &report.extra_in_ledger[..report.extra_in_ledger.len().min(SAMPLE)]
        );
    }

    if !report.is_complete() {
        println!(
            "{} history records are missing from the ledger, e.g. {:?}",
            report.missing_in_ledger.len(),
            &report.missing_in_ledger[..report.missing_in_ledger.len().min(SAMPLE)]
        );
        return Err(format!(
            "{} history records are missing from the ledger",
            report.missing_in_ledger.len()
        )
        .into());
    }

    println!("All history records are present in the ledger");
    Ok(())
}
