//! Periodic prune-by-age worker under a cancellation scope.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::storage::StorageEngine;

const TICK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Minimum retention accepted by configuration; enforced there, restated
/// here as the floor this worker assumes.
pub const MIN_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Spawn the retention scheduler. Returns `None` (and logs) if `retention`
/// is `None` — "never"/unset disables the worker entirely.
pub fn spawn(
    storage: Arc<dyn StorageEngine>,
    retention: Option<Duration>,
    cancel: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let retention = retention?;

    Some(tokio::spawn(async move {
        info!(retention_secs = retention.as_secs(), "retention scheduler: started");
        run_pass(&storage, retention).await;

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.tick().await; // consume the immediate first tick; we already ran one pass
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_pass(&storage, retention).await;
                }
                _ = cancel.cancelled() => {
                    info!("retention scheduler: cancelled, stopping");
                    return;
                }
            }
        }
    }))
}

async fn run_pass(storage: &Arc<dyn StorageEngine>, retention: Duration) {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
    match storage.delete_older_than(cutoff).await {
        Ok(deleted) => info!(deleted, %cutoff, "retention scheduler: pruned"),
        Err(e) => error!(error = %e, "retention scheduler: prune failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cost, Model, Request, Token};
    use crate::storage::SqliteStorageEngine;

    #[tokio::test]
    async fn disabled_when_retention_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("r.db")).unwrap());
        let handle = spawn(storage, None, CancellationToken::new());
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageEngine> =
            Arc::new(SqliteStorageEngine::open(dir.path().join("r.db")).unwrap());
        let token = CancellationToken::new();
        let handle = spawn(storage, Some(MIN_RETENTION), token.clone()).unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should stop promptly after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn startup_pass_prunes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorageEngine::open(dir.path().join("r.db")).unwrap());
        let old = Utc::now() - chrono::Duration::hours(48);
        storage
            .save(&Request::new(
                "s1",
                old,
                Model::new("claude-3-haiku"),
                Token::default(),
                Cost::default(),
                0,
            ))
            .await
            .unwrap();

        let storage_dyn: Arc<dyn StorageEngine> = storage.clone();
        let token = CancellationToken::new();
        let handle = spawn(storage_dyn, Some(MIN_RETENTION), token.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert!(storage.find_all().await.unwrap().is_empty());
    }
}
