use thiserror::Error;

/// Storage-boundary error. Opening and I/O failures are the only ways this
/// surfaces; callers above this layer decide whether that's fatal
/// (startup) or advisory (ingest).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage query error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("timed out acquiring the storage file lock")]
    LockTimeout,

    #[error("database file not found (read-only open requires an existing file)")]
    NotFound,
}
