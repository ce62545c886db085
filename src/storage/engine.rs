use async_trait::async_trait;

use crate::domain::{Period, Request};

use super::error::StorageError;

/// The time-ordered embedded key-value store contract.
///
/// Keys are composite `(timestamp, session_id)`, ordered byte-lexicographic
/// so a forward scan yields chronological order. Implementations are
/// `Send + Sync` so they can be shared behind an `Arc` across RPC handlers
/// and background workers.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Persist a request. Overwrite semantics on a duplicate
    /// `(timestamp, session_id)` key are permitted (idempotent upsert).
    async fn save(&self, request: &Request) -> Result<(), StorageError>;

    /// Requests with `timestamp` in `period`, chronological order, skipping
    /// `offset` and capped at `limit` (0 = unbounded).
    async fn find_by_period(
        &self,
        period: Period,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Request>, StorageError>;

    /// Total count of requests with `timestamp` in `period`, ignoring
    /// pagination. Used alongside [`StorageEngine::find_by_period`] to
    /// answer `GetAPIRequests`' `total_count`.
    async fn count_by_period(&self, period: Period) -> Result<u64, StorageError>;

    /// Every stored request, chronological order. Used by statistics
    /// logging and tests; not optimized for large collections.
    async fn find_all(&self) -> Result<Vec<Request>, StorageError>;

    /// Remove every record with `timestamp < cutoff`. Returns the count
    /// removed.
    async fn delete_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StorageError>;
}
