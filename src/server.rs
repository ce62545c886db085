//! Startup sequence, signal-driven graceful shutdown, background workers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache;
use crate::config::Config;
use crate::domain::{Period, Stats};
use crate::query::QueryCore;
use crate::retention;
use crate::rpc;
use crate::storage::{SqliteStorageEngine, StorageEngine};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Runs the server until a shutdown signal is received. Returns once every
/// background worker and the RPC listener have stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let storage: Arc<dyn StorageEngine> =
        Arc::new(SqliteStorageEngine::open(&config.database_path)?);
    info!(path = %config.database_path.display(), "storage opened");

    let stats_cache = cache::build(config.cache_enabled, config.cache_ttl);
    let query = Arc::new(QueryCore::new(storage.clone(), stats_cache.clone()));

    let addr: std::net::SocketAddr = config.server_address.parse()?;
    let root_cancel = CancellationToken::new();

    let retention_handle = retention::spawn(storage.clone(), config.retention, root_cancel.clone());
    let cache_sweeper_handle =
        cache::spawn_sweeper(stats_cache, config.cache_ttl, root_cancel.clone());
    let stats_logger_handle = spawn_stats_logger(storage.clone(), root_cancel.clone());

    let router = rpc::build_router(storage.clone(), query.clone());

    let shutdown_cancel = root_cancel.clone();
    let signal = async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, cancelling scope");
        shutdown_cancel.cancel();
    };

    info!(%addr, "listening");
    let serve_result = router.serve_with_shutdown(addr, signal).await;

    root_cancel.cancel();
    if let Some(handle) = retention_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), cache_sweeper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), stats_logger_handle).await;

    drop(storage);
    info!("storage closed, shutdown complete");

    serve_result.map_err(anyhow::Error::from)
}

/// Logs an all-time summary every tick, read straight from storage so the
/// number reflects every stored request regardless of cache state.
fn spawn_stats_logger(
    storage: Arc<dyn StorageEngine>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match storage.find_all().await {
                        Ok(requests) => {
                            let stats = Stats::from_requests(Period::all_time(), &requests);
                            info!(
                                total_requests = stats.total_requests(),
                                total_tokens = stats.total_tokens().total(),
                                total_cost = stats.total_cost().amount,
                                "periodic stats summary"
                            );
                        }
                        Err(e) => error!(error = %e, "periodic stats summary failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("stats logger: cancelled, stopping");
                    return;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
