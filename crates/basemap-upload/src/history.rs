//! Import and verification of legacy JSON upload history.
//!
//! Older deployments kept their history in a JSON object keyed by
//! `category/basename`:
//!
//! ```json
//! { "regions/a.tif": { "uploaded_at": "2024-03-01T10:22:31.123456",
//!                      "original_path": "/data/regions/a.tif",
//!                      "prefix": "regions" } }
//! ```
//!
//! Timestamps without an offset are taken to be in the system time zone.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use jiff::tz::TimeZone;
use jiff::{Timestamp, civil};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::key::FileKey;
use crate::ledger::{Ledger, LedgerError, UploadRecord};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Cannot read history file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("History file {path} is not a JSON object of records: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Deserialize)]
struct LegacyRecord {
    uploaded_at: String,
    original_path: String,
    prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub history_count: usize,
    pub ledger_count: usize,
    /// Keys in the history file that the ledger does not have.
    pub missing_in_ledger: Vec<String>,
    /// Keys in the ledger that the history file does not have.
    pub extra_in_ledger: Vec<String>,
}

impl VerifyReport {
    /// Every history entry is in the ledger.
    pub fn is_complete(&self) -> bool {
        self.missing_in_ledger.is_empty()
    }
}

fn read_history(path: &Path) -> Result<BTreeMap<String, serde_json::Value>, HistoryError> {
    let data = fs::read(path).map_err(|source| HistoryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| HistoryError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn parse_timestamp(s: &str) -> Result<Timestamp, jiff::Error> {
    if let Ok(ts) = s.parse::<Timestamp>() {
        return Ok(ts);
    }
    let datetime: civil::DateTime = s.parse()?;
    Ok(datetime.to_zoned(TimeZone::system())?.timestamp())
}

fn convert(key: &str, value: serde_json::Value) -> Result<UploadRecord, String> {
    let file_key = FileKey::parse(key).ok_or("key is not of the form category/name")?;
    let legacy: LegacyRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if legacy.prefix != file_key.category() {
        return Err(format!(
            "prefix {:?} does not match key category {:?}",
            legacy.prefix,
            file_key.category()
        ));
    }
    let uploaded_at = parse_timestamp(&legacy.uploaded_at).map_err(|e| e.to_string())?;

    Ok(UploadRecord {
        key: file_key,
        uploaded_at,
        source_path: legacy.original_path,
        category: legacy.prefix,
    })
}

/// Copy every valid record from a legacy history file into the ledger.
///
/// Existing ledger records with the same key are replaced. Invalid records are
/// logged and counted but do not stop the import.
pub fn import_json_history(ledger: &Ledger, path: &Path) -> Result<ImportReport, HistoryError> {
    let history = read_history(path)?;
    let mut report = ImportReport {
        total: history.len(),
        ..Default::default()
    };

    for (key, value) in history {
        match convert(&key, value) {
            Ok(record) => {
                ledger.insert_record(&record)?;
                report.imported += 1;
            }
            Err(reason) => {
                warn!(%key, %reason, "Skipping invalid history record");
                report.invalid += 1;
            }
        }
    }

    info!(
        imported = report.imported,
        invalid = report.invalid,
        "History import finished"
    );
    Ok(report)
}

/// Compare the keys of a legacy history file with the ledger.
pub fn verify_json_history(ledger: &Ledger, path: &Path) -> Result<VerifyReport, HistoryError> {
    let history = read_history(path)?;
    let history_keys: BTreeSet<String> = history.into_keys().collect();
    let ledger_keys: BTreeSet<String> = ledger.keys()?.into_iter().collect();

    Ok(VerifyReport {
        history_count: history_keys.len(),
        ledger_count: ledger_keys.len(),
        missing_in_ledger: history_keys.difference(&ledger_keys).cloned().collect(),
        extra_in_ledger: ledger_keys.difference(&history_keys).cloned().collect(),
    })
}
