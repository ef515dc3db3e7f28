use clap::{Parser, Subcommand};
use lloggs::LoggingArgs;
use tracing::error;

use basemap_upload::{ConfigError, RunError};

mod commands;

use commands::{EXIT_CONFIG, EXIT_FAILURE, EXIT_INTERRUPTED};

#[derive(Parser)]
#[command(name = "basemap-upload")]
#[command(about = "Upload basemap tiles to an object store, exactly once each")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Upload every file not yet in the ledger, resuming from the last checkpoint
    Upload(commands::upload::UploadArgs),

    /// List files that still need uploading, without touching any state
    Scan(commands::scan::ScanArgs),

    /// Show ledger totals and any saved checkpoint or progress
    Status(commands::status::StatusArgs),

    /// Import a legacy upload_history.json into the ledger
    ImportHistory(commands::history::HistoryArgs),

    /// Check that every record of a legacy upload_history.json is in the ledger
    VerifyHistory(commands::history::HistoryArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Settings may come from a .env file; it has to be loaded before clap
    // reads the environment.
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    let result = match args.command {
        Command::Upload(args) => commands::upload::run(args),
        Command::Scan(args) => commands::scan::run(args),
        Command::Status(args) => commands::status::run(args),
        Command::ImportHistory(args) => commands::history::import(args),
        Command::VerifyHistory(args) => commands::history::verify(args),
    };

    if let Err(err) = result {
        let code = exit_code(&*err);
        error!("{}", err);
        if code == EXIT_INTERRUPTED {
            eprintln!("Re-run the same command to resume from saved progress.");
        }
        std::process::exit(code);
    }

    Ok(())
}

fn exit_code(err: &(dyn std::error::Error + Send + Sync + 'static)) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_CONFIG
    } else if let Some(RunError::Interrupted { .. }) = err.downcast_ref::<RunError>() {
        EXIT_INTERRUPTED
    } else {
        EXIT_FAILURE
    }
}
