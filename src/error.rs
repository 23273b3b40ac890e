use serde::Serialize;
use thiserror::Error;

/// Coarse classification callers branch on instead of matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    TransientStore,
    FatalStore,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TransientStore => "transient_store",
            ErrorKind::FatalStore => "fatal_store",
        }
    }
}

/// Errors raised by a unit of work and the synchronizer running inside it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),

    /// A version-guarded write touched zero rows.
    #[error("version conflict on {table} row {id} (expected sync_version {expected})")]
    Conflict {
        table: &'static str,
        id: i64,
        expected: i64,
    },

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Fatal(String),

    #[error("synchronization failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<SyncError>,
    },
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Conflict { .. } => ErrorKind::Conflict,
            SyncError::Transient(_) => ErrorKind::TransientStore,
            SyncError::Fatal(_) | SyncError::RetriesExhausted { .. } => ErrorKind::FatalStore,
        }
    }

    /// Conflicts and lock contention are worth re-running the whole unit of work for.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::TransientStore)
    }
}

// SQLite primary result codes for lock contention
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Returns true when a database error code (possibly an extended code) is a
/// busy/locked condition.
pub fn is_lock_contention_code(code: &str) -> bool {
    match code.parse::<i64>() {
        Ok(c) => matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED),
        Err(_) => false,
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let contended = db_err
                    .code()
                    .map(|c| is_lock_contention_code(&c))
                    .unwrap_or(false);
                if contended || db_err.message().contains("database is locked") {
                    SyncError::Transient(db_err.message().to_string())
                } else {
                    SyncError::Fatal(err.to_string())
                }
            }
            _ => SyncError::Fatal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Fatal(format!("failed to encode snapshot: {}", err))
    }
}
