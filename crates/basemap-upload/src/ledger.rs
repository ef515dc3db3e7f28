//! Upload ledger.
//!
//! Uses SQLite to record which logical files have been uploaded. The ledger is
//! the authoritative answer to "was this file already uploaded?": checkpoints
//! and progress counters are only hints layered on top of it.

use std::fs;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::key::FileKey;

/// Ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub key: FileKey,
    pub uploaded_at: Timestamp,
    pub source_path: String,
    pub category: String,
}

/// Handle on the upload ledger database.
///
/// Every write is a single autocommit statement, so it is durable by the time
/// the call returns. One process at a time should hold a writable ledger.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open or create the ledger at `path`.
    ///
    /// A file that exists but is not a usable SQLite database is renamed to
    /// `<name>.corrupt` and replaced with an empty ledger. Any other failure is
    /// returned to the caller.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        match Self::open_and_init(path) {
            Err(LedgerError::Sqlite(err)) if is_corruption(&err) => {
                let quarantine = quarantine_path(path);
                error!(
                    ?path,
                    ?quarantine,
                    %err,
                    "Ledger is unreadable, moving it aside and starting with empty history"
                );
                fs::rename(path, &quarantine)?;
                Self::open_and_init(path)
            }
            other => other,
        }
    }

    /// Open an existing ledger without write access.
    pub fn open_read_only(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory ledger (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn open_and_init(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                file_key TEXT PRIMARY KEY,
                uploaded_at INTEGER NOT NULL,
                source_path TEXT NOT NULL,
                category TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_uploads_category ON uploads(category);
            "#,
        )?;
        Ok(())
    }

    /// Close the ledger, surfacing any error from the final flush.
    pub fn close(self) -> Result<(), LedgerError> {
        self.conn.close().map_err(|(_, err)| LedgerError::Sqlite(err))
    }

    /// Whether the logical file for `source_path` in `category` was uploaded.
    ///
    /// A failed lookup is logged and answered with `false`: at worst the file
    /// is offered for upload again and the store reports it as already present.
    pub fn is_uploaded(&self, source_path: &Path, category: &str) -> bool {
        let key = FileKey::new(source_path, category);
        match self.contains(&key) {
            Ok(found) => found,
            Err(err) => {
                warn!(%key, %err, "Ledger lookup failed, treating file as not uploaded");
                false
            }
        }
    }

    /// Whether a record exists for `key`.
    pub fn contains(&self, key: &FileKey) -> Result<bool, LedgerError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM uploads WHERE file_key = ?1")?;
        Ok(stmt.exists(params![key.as_str()])?)
    }

    /// Record a completed upload, stamped with the current time.
    ///
    /// Marking the same logical file again replaces the existing record.
    pub fn mark_uploaded(
        &self,
        source_path: &Path,
        category: &str,
    ) -> Result<UploadRecord, LedgerError> {
        let record = UploadRecord {
            key: FileKey::new(source_path, category),
            uploaded_at: Timestamp::now(),
            source_path: source_path.to_string_lossy().into_owned(),
            category: category.to_string(),
        };
        self.insert_record(&record)?;
        debug!(key = %record.key, "Marked uploaded");
        Ok(record)
    }

    /// Insert or replace a record as given.
    pub fn insert_record(&self, record: &UploadRecord) -> Result<(), LedgerError> {
        let mut stmt = self.conn.prepare_cached(
            r#"INSERT INTO uploads (file_key, uploaded_at, source_path, category)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_key) DO UPDATE SET
                uploaded_at = excluded.uploaded_at,
                source_path = excluded.source_path,
                category = excluded.category"#,
        )?;
        stmt.execute(params![
            record.key.as_str(),
            record.uploaded_at.as_millisecond(),
            record.source_path,
            record.category,
        ])?;
        Ok(())
    }

    /// Look up the record for the logical file of `source_path` in `category`.
    ///
    /// A record that exists but cannot be decoded is logged and reported as absent.
    pub fn get_upload_info(
        &self,
        source_path: &Path,
        category: &str,
    ) -> Result<Option<UploadRecord>, LedgerError> {
        self.get(&FileKey::new(source_path, category))
    }

    /// Look up a record by key.
    pub fn get(&self, key: &FileKey) -> Result<Option<UploadRecord>, LedgerError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT uploaded_at, source_path, category FROM uploads WHERE file_key = ?1",
        )?;

        // Column decoding is deferred so a damaged row can be reported instead
        // of failing the query.
        let row = stmt
            .query_row(params![key.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0),
                    row.get::<_, String>(1),
                    row.get::<_, String>(2),
                ))
            })
            .optional()?;

        let Some((uploaded_at, source_path, category)) = row else {
            return Ok(None);
        };

        let decoded = (|| -> Result<UploadRecord, String> {
            let millis = uploaded_at.map_err(|e| e.to_string())?;
            Ok(UploadRecord {
                key: key.clone(),
                uploaded_at: Timestamp::from_millisecond(millis).map_err(|e| e.to_string())?,
                source_path: source_path.map_err(|e| e.to_string())?,
                category: category.map_err(|e| e.to_string())?,
            })
        })();

        match decoded {
            Ok(record) => Ok(Some(record)),
            Err(reason) => {
                warn!(%key, %reason, "Ignoring unreadable ledger record");
                Ok(None)
            }
        }
    }

    /// Number of records in the ledger.
    pub fn len(&self) -> Result<u64, LedgerError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM uploads", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_key FROM uploads ORDER BY file_key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Record counts per category, sorted by category.
    pub fn category_counts(&self) -> Result<Vec<(String, u64)>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM uploads GROUP BY category ORDER BY category",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}
