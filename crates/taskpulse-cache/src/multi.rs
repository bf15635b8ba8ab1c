//! The two-level cache front: L1 first, L2 behind it.
//!
//! `get` checks L1, then L2 (backfilling L1 on a hit), then reports a
//! total miss. `put` writes L1 synchronously and propagates to L2 per
//! the configured [`WriteStrategy`]. A per-key epoch counter prevents a
//! delayed write-back flush from resurrecting a value deleted by
//! `invalidate`: the flush is dropped when its epoch is stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::{EvictionPolicy, WriteStrategy};
use crate::error::CacheError;
use crate::remote::RemoteCache;
use crate::store::L1Store;

/// Callback invoked when an asynchronous write-back flush fails.
///
/// Failures are contained: they reach this hook and a counter, never
/// the `put` caller.
pub type FlushFailureHook = Arc<dyn Fn(&str, &CacheError) + Send + Sync>;

/// Configuration for the multi-level cache.
#[derive(Debug, Clone)]
pub struct MultiLevelConfig {
    /// Maximum number of entries held in L1.
    pub l1_max_entries: usize,
    /// Maximum total payload bytes held in L1.
    pub l1_max_bytes: usize,
    /// TTL applied when the caller passes none.
    pub default_ttl: Duration,
    /// L1 eviction policy.
    pub policy: EvictionPolicy,
    /// L2 write strategy.
    pub strategy: WriteStrategy,
    /// Flush queue depth before write-back puts degrade to synchronous
    /// L2 writes.
    pub write_back_depth: usize,
}

impl Default for MultiLevelConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 10_000,
            l1_max_bytes: 64 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
            policy: EvictionPolicy::Lru,
            strategy: WriteStrategy::WriteThrough,
            write_back_depth: 1024,
        }
    }
}

/// Point-in-time cache statistics for the performance monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads served from L1.
    pub l1_hits: u64,
    /// Reads that missed L1.
    pub l1_misses: u64,
    /// L1 misses served from L2.
    pub l2_hits: u64,
    /// Reads that missed both levels.
    pub l2_misses: u64,
    /// Live L1 entries.
    pub l1_entries: usize,
    /// Live L1 payload bytes.
    pub l1_bytes: usize,
    /// L1 entries evicted by policy.
    pub evictions: u64,
    /// Write-back flushes that failed against L2.
    pub write_back_failures: u64,
    /// Write-back flushes dropped because their epoch was stale.
    pub stale_flushes_dropped: u64,
}

impl CacheStats {
    /// Fraction of reads served from either level, 1.0 when idle.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.l1_hits.saturating_add(self.l2_hits);
        let total = hits.saturating_add(self.l2_misses);
        if total == 0 {
            1.0
        } else {
            ratio(hits, total)
        }
    }

    /// Fraction of reads served from L1 alone, 1.0 when idle.
    pub fn l1_hit_ratio(&self) -> f64 {
        let total = self.l1_hits.saturating_add(self.l1_misses);
        if total == 0 {
            1.0
        } else {
            ratio(self.l1_hits, total)
        }
    }
}

// u64 -> f64 precision loss is irrelevant at counter magnitudes.
#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    part as f64 / whole as f64
}

#[derive(Debug, Default)]
struct Counters {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    write_back_failures: AtomicU64,
    stale_flushes_dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// One queued write-back flush.
struct FlushJob {
    key: String,
    json: String,
    ttl: Duration,
    epoch: u64,
}

/// The multi-level cache front.
pub struct MultiLevelCache {
    l1: Arc<Mutex<L1Store>>,
    remote: RemoteCache,
    default_ttl: Duration,
    strategy: WriteStrategy,
    counters: Arc<Counters>,
    flush_tx: Mutex<Option<mpsc::Sender<FlushJob>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl MultiLevelCache {
    /// Build the cache over an established L2 connection.
    ///
    /// With [`WriteStrategy::WriteBack`] this spawns the flusher task;
    /// call [`shutdown`](Self::shutdown) to drain it.
    pub fn new(remote: RemoteCache, config: &MultiLevelConfig) -> Self {
        Self::build(remote, config, None)
    }

    /// Build the cache with a hook observing write-back flush failures.
    pub fn with_flush_hook(
        remote: RemoteCache,
        config: &MultiLevelConfig,
        hook: FlushFailureHook,
    ) -> Self {
        Self::build(remote, config, Some(hook))
    }

    fn build(
        remote: RemoteCache,
        config: &MultiLevelConfig,
        hook: Option<FlushFailureHook>,
    ) -> Self {
        let l1 = Arc::new(Mutex::new(L1Store::new(
            config.l1_max_entries,
            config.l1_max_bytes,
            config.policy,
        )));
        let counters = Arc::new(Counters::default());

        let (flush_tx, flusher) = if config.strategy == WriteStrategy::WriteBack {
            let (tx, rx) = mpsc::channel(config.write_back_depth.max(1));
            let handle = tokio::spawn(run_flusher(
                rx,
                Arc::clone(&l1),
                remote.clone(),
                Arc::clone(&counters),
                hook,
            ));
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            l1,
            remote,
            default_ttl: config.default_ttl,
            strategy: config.strategy,
            counters,
            flush_tx: Mutex::new(flush_tx),
            flusher: Mutex::new(flusher),
        }
    }

    fn lock_l1(&self) -> std::sync::MutexGuard<'_, L1Store> {
        self.l1.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read `key`, checking L1, then L2 with an L1 backfill.
    ///
    /// Returns `Ok(None)` on a total miss; the caller decides whether
    /// to load from storage and [`put`](Self::put).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the L2 round trip or deserialization
    /// fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        // L1 is synchronous: a hit never waits on the network.
        let l1_value = self.lock_l1().get(key);
        if let Some(value) = l1_value {
            Counters::bump(&self.counters.l1_hits);
            return Ok(Some(serde_json::from_value(value)?));
        }
        Counters::bump(&self.counters.l1_misses);

        match self.remote.get_raw(key).await? {
            Some(json) => {
                Counters::bump(&self.counters.l2_hits);
                let value: serde_json::Value = serde_json::from_str(&json)?;
                self.lock_l1()
                    .backfill(key, value.clone(), json.len(), self.default_ttl);
                Ok(Some(serde_json::from_value(value)?))
            }
            None => {
                Counters::bump(&self.counters.l2_misses);
                Ok(None)
            }
        }
    }

    /// Write `key`, L1 synchronously and L2 per the write strategy.
    ///
    /// `ttl` defaults to the configured TTL. Under write-back, a full
    /// flush queue degrades this put to a synchronous L2 write instead
    /// of blocking the caller behind the backlog.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization fails, or if a
    /// synchronous L2 write fails. Queued write-back failures go to the
    /// flush-failure hook instead.
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let json = serde_json::to_string(value)?;
        let parsed: serde_json::Value = serde_json::from_str(&json)?;

        let epoch = self.lock_l1().insert(key, parsed, json.len(), ttl);

        match self.strategy {
            WriteStrategy::WriteThrough => self.remote.set_raw(key, &json, ttl).await,
            WriteStrategy::WriteBack => {
                let sender = {
                    let guard = self
                        .flush_tx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    guard.clone()
                };
                let job = FlushJob {
                    key: key.to_owned(),
                    json,
                    ttl,
                    epoch,
                };
                let Some(tx) = sender else {
                    // Flusher already shut down; degrade to a
                    // synchronous write.
                    return self.remote.set_raw(&job.key, &job.json, job.ttl).await;
                };
                match tx.try_send(job) {
                    Ok(()) => Ok(()),
                    Err(
                        mpsc::error::TrySendError::Full(job)
                        | mpsc::error::TrySendError::Closed(job),
                    ) => {
                        tracing::debug!(key, "Write-back queue unavailable, flushing inline");
                        self.remote.set_raw(&job.key, &job.json, job.ttl).await
                    }
                }
            }
        }
    }

    /// Remove `key` from both levels and fence off in-flight flushes.
    ///
    /// The epoch bump happens before the removals, so any write-back
    /// flush queued for an earlier epoch is dropped when it surfaces.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the L2 delete fails; L1 is cleared
    /// regardless.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        {
            let mut l1 = self.lock_l1();
            l1.bump_epoch(key);
            l1.remove(key);
        }
        self.remote.delete(key).await
    }

    /// Snapshot hit/miss counters and L1 occupancy.
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes, evictions) = {
            let l1 = self.lock_l1();
            (l1.len(), l1.bytes(), l1.evictions())
        };
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l1_misses: self.counters.l1_misses.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            l2_misses: self.counters.l2_misses.load(Ordering::Relaxed),
            l1_entries: entries,
            l1_bytes: bytes,
            evictions,
            write_back_failures: self.counters.write_back_failures.load(Ordering::Relaxed),
            stale_flushes_dropped: self.counters.stale_flushes_dropped.load(Ordering::Relaxed),
        }
    }

    /// Drain the write-back flusher and stop it.
    ///
    /// A no-op under write-through. Safe to call more than once.
    pub async fn shutdown(&self) {
        let tx = {
            let mut guard = self
                .flush_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        drop(tx);

        let handle = {
            let mut guard = self.flusher.lock().unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        if let Some(handle) = handle {
            if handle.await.is_err() {
                tracing::warn!("Write-back flusher ended abnormally");
            }
            tracing::info!("Write-back flusher drained");
        }
    }
}

/// The write-back flusher loop: applies queued flushes to L2, dropping
/// any whose epoch has been superseded by a newer put or invalidate.
async fn run_flusher(
    mut rx: mpsc::Receiver<FlushJob>,
    l1: Arc<Mutex<L1Store>>,
    remote: RemoteCache,
    counters: Arc<Counters>,
    hook: Option<FlushFailureHook>,
) {
    while let Some(job) = rx.recv().await {
        let stale = {
            let guard = l1.lock().unwrap_or_else(PoisonError::into_inner);
            guard.current_epoch(&job.key) > job.epoch
        };
        if stale {
            Counters::bump(&counters.stale_flushes_dropped);
            tracing::debug!(key = %job.key, epoch = job.epoch, "Dropped stale write-back flush");
            continue;
        }

        if let Err(e) = remote.set_raw(&job.key, &job.json, job.ttl).await {
            Counters::bump(&counters.write_back_failures);
            tracing::warn!(key = %job.key, error = %e, "Write-back flush failed");
            if let Some(hook) = &hook {
                hook(&job.key, &e);
            }
        }
    }
}
