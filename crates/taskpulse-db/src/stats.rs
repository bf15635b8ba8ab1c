//! Monotonic operation counters and snapshots.
//!
//! Counters accumulate for the lifetime of one pool initialization and
//! reset on [`close`](crate::pool::DatabasePool::close). A single mutex
//! serializes counter updates; it is never held across a suspension
//! point and never guards a connection.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time snapshot of pool statistics.
///
/// Served by health/stats endpoints and sampled by the performance
/// monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Physical connections opened since initialization.
    pub connections_created: u64,
    /// Physical connections closed since initialization.
    pub connections_closed: u64,
    /// Connections currently leased out.
    pub active: u32,
    /// Connections currently idle in the pool.
    pub idle: u32,
    /// Successful acquisitions.
    pub acquires: u64,
    /// Acquisitions that failed on their deadline.
    pub acquire_timeouts: u64,
    /// Queries executed (successful or not).
    pub queries: u64,
    /// Queries that returned an error.
    pub query_errors: u64,
    /// Total time spent executing queries, in microseconds.
    pub total_query_micros: u64,
}

impl PoolStats {
    /// Mean query latency in microseconds, 0 when no query has run.
    pub fn mean_query_micros(&self) -> u64 {
        if self.queries == 0 {
            0
        } else {
            self.total_query_micros / self.queries
        }
    }
}

/// Internal mutable counters behind the stats mutex.
#[derive(Debug, Default)]
struct Counters {
    connections_created: u64,
    acquires: u64,
    acquire_timeouts: u64,
    queries: u64,
    query_errors: u64,
    total_query_micros: u64,
}

/// Thread-safe recorder the pool feeds on every operation.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    counters: Mutex<Counters>,
}

impl StatsRecorder {
    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A poisoned mutex only means a panic elsewhere; the counters
        // themselves are always valid u64s.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn note_connection_created(&self) {
        let mut c = self.lock();
        c.connections_created = c.connections_created.saturating_add(1);
    }

    pub(crate) fn note_acquire(&self) {
        let mut c = self.lock();
        c.acquires = c.acquires.saturating_add(1);
    }

    pub(crate) fn note_acquire_timeout(&self) {
        let mut c = self.lock();
        c.acquire_timeouts = c.acquire_timeouts.saturating_add(1);
    }

    pub(crate) fn note_query(&self, elapsed: Duration, failed: bool) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let mut c = self.lock();
        c.queries = c.queries.saturating_add(1);
        if failed {
            c.query_errors = c.query_errors.saturating_add(1);
        }
        c.total_query_micros = c.total_query_micros.saturating_add(micros);
    }

    pub(crate) fn reset(&self) {
        *self.lock() = Counters::default();
    }

    /// Produce a snapshot, merging in point-in-time pool gauges.
    ///
    /// `size` and `idle` come from the underlying pool; closed
    /// connections are derived from created minus currently open.
    pub(crate) fn snapshot(&self, size: u32, idle: u32) -> PoolStats {
        let c = self.lock();
        PoolStats {
            connections_created: c.connections_created,
            connections_closed: c.connections_created.saturating_sub(u64::from(size)),
            active: size.saturating_sub(idle),
            idle,
            acquires: c.acquires,
            acquire_timeouts: c.acquire_timeouts,
            queries: c.queries,
            query_errors: c.query_errors,
            total_query_micros: c.total_query_micros,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let recorder = StatsRecorder::default();
        recorder.note_acquire();
        recorder.note_acquire();
        recorder.note_query(Duration::from_micros(150), false);
        recorder.note_query(Duration::from_micros(50), true);

        let stats = recorder.snapshot(3, 1);
        assert_eq!(stats.acquires, 2);
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.query_errors, 1);
        assert_eq!(stats.total_query_micros, 200);
        assert_eq!(stats.mean_query_micros(), 100);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn closed_is_derived_from_created_and_open() {
        let recorder = StatsRecorder::default();
        for _ in 0..5 {
            recorder.note_connection_created();
        }
        let stats = recorder.snapshot(2, 2);
        assert_eq!(stats.connections_created, 5);
        assert_eq!(stats.connections_closed, 3);
    }

    #[test]
    fn reset_clears_everything() {
        let recorder = StatsRecorder::default();
        recorder.note_acquire();
        recorder.note_query(Duration::from_micros(10), false);
        recorder.reset();
        let stats = recorder.snapshot(0, 0);
        assert_eq!(stats, PoolStats::default());
    }

    #[test]
    fn mean_is_zero_without_queries() {
        assert_eq!(PoolStats::default().mean_query_micros(), 0);
    }
}
