//! Integration tests for the `taskpulse-cache` multi-level cache.
//!
//! These tests require a live Redis-compatible instance. Run with:
//!
//! ```bash
//! docker compose up -d
//! cargo test -p taskpulse-cache -- --ignored
//! docker compose down
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskpulse_cache::{
    EvictionPolicy, MultiLevelCache, MultiLevelConfig, RemoteCache, WriteStrategy,
};

/// Redis-compatible URL for the local Docker instance.
const CACHE_URL: &str = "redis://localhost:6379/0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TaskRecord {
    name: String,
    percent: u8,
}

fn record(name: &str, percent: u8) -> TaskRecord {
    TaskRecord {
        name: name.to_owned(),
        percent,
    }
}

async fn connect() -> RemoteCache {
    let remote = RemoteCache::connect(CACHE_URL)
        .await
        .expect("Failed to connect to cache -- is Docker running?");
    remote.flush_all().await.expect("Failed to flush");
    remote
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn write_through_round_trip() {
    let cache = MultiLevelCache::new(connect().await, &MultiLevelConfig::default());

    cache
        .put("task:1", &record("index", 40), None)
        .await
        .expect("put failed");

    let got: Option<TaskRecord> = cache.get("task:1").await.expect("get failed");
    assert_eq!(got, Some(record("index", 40)));

    // The read was served from L1.
    let stats = cache.stats();
    assert_eq!(stats.l1_hits, 1);
    assert_eq!(stats.l2_hits, 0);
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn l2_hit_backfills_l1() {
    let remote = connect().await;
    let config = MultiLevelConfig::default();

    // Writer populates both levels; a second cache instance with a cold
    // L1 must fall through to L2 once and then hit L1.
    let writer = MultiLevelCache::new(remote.clone(), &config);
    writer
        .put("task:2", &record("load", 10), None)
        .await
        .expect("put failed");

    let reader = MultiLevelCache::new(remote, &config);
    let first: Option<TaskRecord> = reader.get("task:2").await.expect("get failed");
    assert_eq!(first, Some(record("load", 10)));

    let second: Option<TaskRecord> = reader.get("task:2").await.expect("get failed");
    assert_eq!(second, Some(record("load", 10)));

    let stats = reader.stats();
    assert_eq!(stats.l2_hits, 1, "first read should come from L2");
    assert_eq!(stats.l1_hits, 1, "second read should come from L1");
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn total_miss_returns_none() {
    let cache = MultiLevelCache::new(connect().await, &MultiLevelConfig::default());
    let got: Option<TaskRecord> = cache.get("task:absent").await.expect("get failed");
    assert!(got.is_none());

    let stats = cache.stats();
    assert_eq!(stats.l2_misses, 1);
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn invalidate_removes_both_levels() {
    let cache = MultiLevelCache::new(connect().await, &MultiLevelConfig::default());

    cache
        .put("task:3", &record("done", 100), None)
        .await
        .expect("put failed");
    cache.invalidate("task:3").await.expect("invalidate failed");

    let got: Option<TaskRecord> = cache.get("task:3").await.expect("get failed");
    assert!(got.is_none(), "invalidated key must miss both levels");
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn write_back_flush_reaches_l2() {
    let remote = connect().await;
    let config = MultiLevelConfig {
        strategy: WriteStrategy::WriteBack,
        ..MultiLevelConfig::default()
    };

    let cache = MultiLevelCache::new(remote.clone(), &config);
    cache
        .put("task:4", &record("flush", 60), None)
        .await
        .expect("put failed");
    cache.shutdown().await;

    // After the flusher drains, the value is visible straight from L2.
    let raw = remote.get_raw("task:4").await.expect("get failed");
    assert!(raw.is_some(), "write-back flush should have reached L2");
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn stale_write_back_cannot_resurrect_a_delete() {
    let remote = connect().await;
    let config = MultiLevelConfig {
        strategy: WriteStrategy::WriteBack,
        ..MultiLevelConfig::default()
    };

    let cache = MultiLevelCache::new(remote.clone(), &config);
    cache
        .put("task:5", &record("old", 10), None)
        .await
        .expect("put failed");

    // The invalidate bumps the epoch past the queued flush.
    cache.invalidate("task:5").await.expect("invalidate failed");
    cache.shutdown().await;

    let raw = remote.get_raw("task:5").await.expect("get failed");
    assert!(raw.is_none(), "stale flush must not resurrect the key");

    let stats = cache.stats();
    assert!(stats.stale_flushes_dropped >= 1);
}

#[tokio::test]
#[ignore = "requires live Redis-compatible instance (docker compose up -d)"]
async fn l1_eviction_leaves_l2_intact() {
    let remote = connect().await;
    let config = MultiLevelConfig {
        l1_max_entries: 2,
        policy: EvictionPolicy::Lru,
        ..MultiLevelConfig::default()
    };

    let cache = MultiLevelCache::new(remote, &config);
    cache.put("a", &record("a", 1), None).await.expect("put a");
    cache.put("b", &record("b", 2), None).await.expect("put b");
    cache.put("c", &record("c", 3), None).await.expect("put c");

    // a was evicted from L1 but survives in L2, so the read falls
    // through and succeeds.
    let got: Option<TaskRecord> = cache.get("a").await.expect("get failed");
    assert_eq!(got, Some(record("a", 1)));

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.l2_hits, 1);
}

#[tokio::test]
async fn unreachable_cache_fails_fast() {
    // Port 1 is never a Redis server; connect must fail with a
    // connectivity error instead of hanging.
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        RemoteCache::connect("redis://127.0.0.1:1"),
    )
    .await;
    match result {
        Ok(connect_result) => assert!(connect_result.is_err()),
        Err(_) => { /* some environments black-hole the port; a hang past the cap also counts as unreachable */
        }
    }
}
