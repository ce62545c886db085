//! TTL-indexed statistics cache fronting the query core.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{Period, Stats};

/// Cache key: the exact `(start_nanos, end_nanos)` pair a caller used.
/// Deliberately not rounded to whole seconds — rounding would silently
/// merge distinct caller queries (e.g. two sub-second-apart bounds) onto
/// the same cached value, and the wire protocol carries nanosecond
/// timestamps.
type CacheKey = (i64, i64);

/// All-time queries (`Period::all_time()`) stamp `end_at` with a fresh
/// `Utc::now()` on every call, so keying on `end_at` directly would give
/// every all-time query its own cache entry. All-time is instead keyed on
/// this fixed sentinel, independent of when the `Period` was constructed.
const ALL_TIME_KEY: CacheKey = (i64::MIN, i64::MAX);

fn key_for(period: Period) -> CacheKey {
    if period.is_all_time() {
        return ALL_TIME_KEY;
    }
    (
        period.start_at.timestamp_nanos_opt().unwrap_or(i64::MIN),
        period.end_at.timestamp_nanos_opt().unwrap_or(i64::MAX),
    )
}

struct CacheEntry {
    stats: Stats,
    expires_at: Instant,
}

#[async_trait]
pub trait StatsCache: Send + Sync {
    async fn get(&self, period: Period) -> Option<Stats>;
    async fn set(&self, period: Period, stats: Stats);

    /// Remove expired entries. A no-op for caches with nothing to evict.
    async fn sweep(&self);
}

/// Multi-reader, single-writer `(start,end) -> Stats` map with a
/// single-flight eviction sweep.
pub struct TtlStatsCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    sweeping: AtomicBool,
}

impl TtlStatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Remove every entry whose `expires_at` has passed. No-op if a sweep
    /// is already in flight (`compare_exchange` enforces at most one at a
    /// time).
    pub async fn sweep_expired(&self) {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            debug!(removed, "swept expired stats cache entries");
        }
        self.sweeping.store(false, Ordering::Release);
    }
}

#[async_trait]
impl StatsCache for TtlStatsCache {
    async fn get(&self, period: Period) -> Option<Stats> {
        let key = key_for(period);
        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.stats)
        } else {
            None
        }
    }

    async fn set(&self, period: Period, stats: Stats) {
        let key = key_for(period);
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                stats,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn sweep(&self) {
        self.sweep_expired().await;
    }
}

/// Always misses, never writes. Selected when `server.cache.stats.enabled`
/// is `false`.
pub struct NoopCache;

#[async_trait]
impl StatsCache for NoopCache {
    async fn get(&self, _period: Period) -> Option<Stats> {
        None
    }

    async fn set(&self, _period: Period, _stats: Stats) {}

    async fn sweep(&self) {}
}

pub fn build(enabled: bool, ttl: Duration) -> Arc<dyn StatsCache> {
    if enabled {
        Arc::new(TtlStatsCache::new(ttl))
    } else {
        Arc::new(NoopCache)
    }
}

/// Spawn a periodic task that sweeps expired entries out of `cache`.
/// Mirrors `retention::spawn`'s tick/cancel loop; cadence tracks the TTL
/// itself (clamped to a sane floor) since there is no point sweeping
/// faster than entries can expire.
pub fn spawn_sweeper(
    cache: Arc<dyn StatsCache>,
    ttl: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let tick = ttl.max(Duration::from_millis(50));
    tokio::spawn(async move {
        info!(tick_secs = tick.as_secs(), "stats cache sweeper: started");
        let mut interval = tokio::time::interval(tick);
        interval.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    cache.sweep().await;
                }
                _ = cancel.cancelled() => {
                    info!("stats cache sweeper: cancelled, stopping");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn period() -> Period {
        let now = Utc::now();
        Period::new(now, now + chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn hit_within_ttl_then_miss_after_expiry() {
        let cache = TtlStatsCache::new(Duration::from_millis(50));
        let p = period();
        cache.set(p, Stats::empty(p)).await;
        assert!(cache.get(p).await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get(p).await.is_none());
    }

    #[tokio::test]
    async fn distinct_periods_are_distinct_keys() {
        let cache = TtlStatsCache::new(Duration::from_secs(60));
        let p1 = period();
        let p2 = Period::new(p1.start_at, p1.end_at + chrono::Duration::seconds(1));
        cache.set(p1, Stats::empty(p1)).await;
        assert!(cache.get(p2).await.is_none());
    }

    #[tokio::test]
    async fn sub_second_bounds_are_distinct_keys() {
        // The wire protocol carries nanosecond timestamps; two queries
        // whose bounds differ only by sub-second amounts must not collide.
        let cache = TtlStatsCache::new(Duration::from_secs(60));
        let p1 = period();
        let p2 = Period::new(p1.start_at + chrono::Duration::nanoseconds(1), p1.end_at);
        cache.set(p1, Stats::empty(p1)).await;
        assert!(cache.get(p2).await.is_none());
    }

    #[tokio::test]
    async fn repeated_all_time_queries_share_one_cache_entry() {
        // Period::all_time() stamps end_at with a fresh Utc::now() on every
        // call; the cache key must not depend on that, or an all-time query
        // (the dashboard's primary query shape) never hits cache.
        let cache = TtlStatsCache::new(Duration::from_secs(60));
        let first_call = Period::all_time();
        cache.set(first_call, Stats::empty(first_call)).await;

        std::thread::sleep(Duration::from_millis(5));
        let second_call = Period::all_time();
        assert_ne!(first_call.end_at, second_call.end_at);
        assert!(cache.get(second_call).await.is_some());
    }

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        let p = period();
        cache.set(p, Stats::empty(p)).await;
        assert!(cache.get(p).await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let cache = TtlStatsCache::new(Duration::from_millis(30));
        let p1 = period();
        let p2 = Period::new(p1.start_at + chrono::Duration::seconds(1), p1.end_at);
        cache.set(p1, Stats::empty(p1)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.set(p2, Stats::empty(p2)).await;

        cache.sweep().await;
        let entries = cache.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(&key_for(p2)));
    }

    #[tokio::test]
    async fn concurrent_sweeps_do_not_overlap() {
        let cache = Arc::new(TtlStatsCache::new(Duration::from_millis(10)));
        let a = cache.clone();
        let b = cache.clone();
        let (_, _) = tokio::join!(a.sweep(), b.sweep());
        // Both calls return without panicking; the atomic guard means at
        // most one body actually runs the retain pass at a time.
    }

    #[tokio::test]
    async fn background_sweeper_evicts_expired_entries_on_its_own() {
        let concrete = Arc::new(TtlStatsCache::new(Duration::from_millis(20)));
        let cache: Arc<dyn StatsCache> = concrete.clone();
        let p = period();
        cache.set(p, Stats::empty(p)).await;

        let token = CancellationToken::new();
        let handle = spawn_sweeper(cache, Duration::from_millis(20), token.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(concrete.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn sweeper_stops_promptly_on_cancellation() {
        let cache = build(true, Duration::from_secs(60));
        let token = CancellationToken::new();
        let handle = spawn_sweeper(cache, Duration::from_secs(60), token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should stop promptly after cancellation")
            .unwrap();
    }
}
