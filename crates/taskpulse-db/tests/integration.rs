//! Integration tests for the `taskpulse-db` pool.
//!
//! These tests require a live `PostgreSQL` instance. Run with:
//!
//! ```bash
//! docker compose up -d
//! cargo test -p taskpulse-db -- --ignored
//! docker compose down
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use taskpulse_db::{DatabasePool, DbError, PoolConfig};

/// Connection parameters for the local Docker instance.
fn local_config() -> PoolConfig {
    PoolConfig::new("localhost", "taskpulse", "taskpulse", "taskpulse")
        .with_connections(2, 5)
        .with_connect_timeout(Duration::from_secs(2))
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn initialize_and_round_trip() {
    let pool = DatabasePool::initialize(&local_config())
        .await
        .expect("Failed to initialize pool -- is Docker running?");

    let one: i32 = pool.query_scalar("SELECT 1").await.expect("SELECT 1 failed");
    assert_eq!(one, 1);

    let stats = pool.stats();
    assert_eq!(stats.queries, 1);
    assert_eq!(stats.query_errors, 0);
    assert!(stats.total_query_micros > 0);

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn typed_operations_with_arguments() {
    let pool = DatabasePool::initialize(&local_config())
        .await
        .expect("Failed to initialize pool");

    pool.exec("CREATE TEMP TABLE IF NOT EXISTS smoke (n BIGINT)")
        .await
        .expect("create failed");

    let mut args = PgArguments::default();
    args.add(42i64).expect("bind failed");
    let echoed: i64 = {
        let mut lease = pool.acquire(Duration::from_secs(1)).await.expect("acquire");
        sqlx::query_scalar_with::<_, i64, _>("SELECT $1::BIGINT", args)
            .fetch_one(lease.connection())
            .await
            .expect("echo failed")
    };
    assert_eq!(echoed, 42);

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn sixth_acquire_waits_for_a_release() {
    // Pool with min=2, max=5: five concurrent leases succeed immediately,
    // the sixth waits and succeeds once one of the first five releases.
    let pool = DatabasePool::initialize(&local_config())
        .await
        .expect("Failed to initialize pool");

    let mut leases = Vec::new();
    for _ in 0..5 {
        leases.push(
            pool.acquire(Duration::from_secs(1))
                .await
                .expect("one of the first five acquires timed out"),
        );
    }

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(Duration::from_secs(1)).await.map(|_| ()) })
    };

    // Give the waiter time to start blocking, then release one lease.
    tokio::time::sleep(Duration::from_millis(100)).await;
    leases.pop();

    let result = waiter.await.expect("waiter panicked");
    assert!(result.is_ok(), "sixth acquire should succeed: {result:?}");

    let stats = pool.stats();
    assert_eq!(stats.acquires, 6);
    assert_eq!(stats.acquire_timeouts, 0);

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn acquire_times_out_when_exhausted() {
    let config = local_config().with_connections(1, 1);
    let pool = DatabasePool::initialize(&config)
        .await
        .expect("Failed to initialize pool");

    let _held = pool.acquire(Duration::from_secs(1)).await.expect("acquire");
    let second = pool.acquire(Duration::from_millis(200)).await;
    assert!(matches!(second, Err(DbError::Timeout { .. })));

    let stats = pool.stats();
    assert_eq!(stats.acquire_timeouts, 1);

    pool.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn closed_pool_rejects_acquires() {
    let pool = DatabasePool::initialize(&local_config())
        .await
        .expect("Failed to initialize pool");
    pool.close().await;

    let result = pool.acquire(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(DbError::Closed)));
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn health_check_reports_utilization() {
    let pool = DatabasePool::initialize(&local_config())
        .await
        .expect("Failed to initialize pool");

    let report = pool.health_check().await;
    assert!(report.healthy);
    assert_eq!(report.max_connections, 5);
    assert!(report.utilization >= 0.0 && report.utilization <= 1.0);

    pool.close().await;
}

#[tokio::test]
async fn unreachable_database_fails_fast() {
    // Port 1 is never a PostgreSQL server; initialize must fail with a
    // connectivity error instead of hanging.
    let config = PoolConfig::new("127.0.0.1", "nope", "nope", "nope")
        .with_port(1)
        .with_connect_timeout(Duration::from_millis(500));

    let result = DatabasePool::initialize(&config).await;
    assert!(matches!(result, Err(DbError::Connectivity(_))));
}
