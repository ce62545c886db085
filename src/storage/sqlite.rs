use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::domain::{Cost, Model, Period, Request, Token};

use super::engine::StorageEngine;
use super::error::StorageError;

/// How long to wait for SQLite's file lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a `rusqlite` error to `StorageError`, distinguishing lock
/// contention (`SQLITE_BUSY`/`SQLITE_LOCKED`, surfaced once `busy_timeout`
/// itself gives up) from every other SQL failure.
fn classify(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if matches!(
                ffi_err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StorageError::LockTimeout
        }
        _ => StorageError::Sql(err),
    }
}

/// `rusqlite`-backed embedded key-value store.
///
/// Grounded in `config_db.rs`'s `Mutex<Connection>` pattern: a single
/// writer-serializing lock around one SQLite connection is sufficient for
/// a single-host, append-dominant collector. The `requests` table's
/// primary key is the composite `(timestamp_key, session_id)` where
/// `timestamp_key` is the RFC3339-nanosecond encoding of the UTC
/// timestamp — fixed-width and `Z`-suffixed, so byte-lexicographic order
/// over that column matches chronological order.
pub struct SqliteStorageEngine {
    conn: Mutex<Connection>,
}

fn timestamp_key(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl SqliteStorageEngine {
    /// Open (creating if absent) a writable store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref()).map_err(classify)?;
        conn.busy_timeout(LOCK_TIMEOUT).map_err(classify)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(classify)?;
        let engine = Self {
            conn: Mutex::new(conn),
        };
        engine.run_migrations()?;
        Ok(engine)
    }

    /// Open an existing store read-only. Fails cleanly if the file is
    /// absent rather than creating one.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::NotFound);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(classify)?;
        conn.busy_timeout(LOCK_TIMEOUT).map_err(classify)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS requests (
                timestamp_key         TEXT    NOT NULL,
                session_id            TEXT    NOT NULL,
                timestamp_unix_nano   INTEGER NOT NULL,
                model                 TEXT    NOT NULL,
                input_tokens          INTEGER NOT NULL,
                output_tokens         INTEGER NOT NULL,
                cache_read_tokens     INTEGER NOT NULL,
                cache_creation_tokens INTEGER NOT NULL,
                cost_usd              REAL    NOT NULL,
                duration_ms           INTEGER NOT NULL,
                PRIMARY KEY (timestamp_key, session_id)
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(classify)?;
        Ok(())
    }

    fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<Request> {
        let nanos: i64 = row.get("timestamp_unix_nano")?;
        let timestamp = DateTime::<Utc>::from_timestamp(
            nanos.div_euclid(1_000_000_000),
            nanos.rem_euclid(1_000_000_000) as u32,
        )
        .unwrap_or_else(Utc::now);

        Ok(Request::new(
            row.get::<_, String>("session_id")?,
            timestamp,
            Model::new(row.get::<_, String>("model")?),
            Token::new(
                row.get("input_tokens")?,
                row.get("output_tokens")?,
                row.get("cache_read_tokens")?,
                row.get("cache_creation_tokens")?,
            ),
            Cost::new(row.get("cost_usd")?),
            row.get::<_, i64>("duration_ms")? as u64,
        ))
    }
}

#[async_trait]
impl StorageEngine for SqliteStorageEngine {
    async fn save(&self, request: &Request) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute(
            "INSERT INTO requests (
                timestamp_key, session_id, timestamp_unix_nano, model,
                input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens,
                cost_usd, duration_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (timestamp_key, session_id) DO UPDATE SET
                model = excluded.model,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens,
                cache_read_tokens = excluded.cache_read_tokens,
                cache_creation_tokens = excluded.cache_creation_tokens,
                cost_usd = excluded.cost_usd,
                duration_ms = excluded.duration_ms",
            params![
                timestamp_key(request.timestamp),
                request.session_id,
                request.timestamp.timestamp_nanos_opt().unwrap_or(0),
                request.model.as_str(),
                request.token.input as i64,
                request.token.output as i64,
                request.token.cache_read as i64,
                request.token.cache_creation as i64,
                request.cost.amount,
                request.duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    async fn find_by_period(
        &self,
        period: Period,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Request>, StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let limit: i64 = if limit == 0 { -1 } else { limit as i64 };

        let mut requests = Vec::new();
        if period.is_all_time() {
            let mut stmt = conn.prepare(
                "SELECT * FROM requests ORDER BY timestamp_key ASC, session_id ASC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, offset as i64], Self::row_to_request)?;
            for row in rows {
                requests.push(row?);
            }
        } else {
            let mut stmt = conn.prepare(
                "SELECT * FROM requests
                 WHERE timestamp_key >= ?1 AND timestamp_key < ?2
                 ORDER BY timestamp_key ASC, session_id ASC
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    timestamp_key(period.start_at),
                    timestamp_key(period.end_at),
                    limit,
                    offset as i64
                ],
                Self::row_to_request,
            )?;
            for row in rows {
                requests.push(row?);
            }
        }
        Ok(requests)
    }

    async fn count_by_period(&self, period: Period) -> Result<u64, StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let count: i64 = if period.is_all_time() {
            conn.query_row("SELECT COUNT(*) FROM requests", [], |r| r.get(0))?
        } else {
            conn.query_row(
                "SELECT COUNT(*) FROM requests WHERE timestamp_key >= ?1 AND timestamp_key < ?2",
                params![timestamp_key(period.start_at), timestamp_key(period.end_at)],
                |r| r.get(0),
            )?
        };
        Ok(count.max(0) as u64)
    }

    async fn find_all(&self) -> Result<Vec<Request>, StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT * FROM requests ORDER BY timestamp_key ASC, session_id ASC")?;
        let rows = stmt.query_map([], Self::row_to_request)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let deleted = conn.execute(
            "DELETE FROM requests WHERE timestamp_key < ?1",
            params![timestamp_key(cutoff)],
        )?;
        Ok(deleted as u64)
    }
}

/// Read/write a reserved metadata key. No core behavior consumes this
/// today; reserved for future use.
#[allow(dead_code)]
impl SqliteStorageEngine {
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
