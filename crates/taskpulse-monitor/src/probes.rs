//! Ready-made probes over the four core components.
//!
//! Probes are pure observation: each reads a statistics snapshot and
//! reports one scalar. A probe that cannot currently observe its
//! component (e.g. the broker is down) reports `None` and the sampler
//! records nothing for that interval.

use std::sync::Arc;

use futures::future::BoxFuture;
use taskpulse_cache::MultiLevelCache;
use taskpulse_db::DatabasePool;
use taskpulse_fanout::SessionRegistry;
use taskpulse_queue::PriorityQueue;

use crate::metrics::MetricKind;

/// One observable scalar, sampled periodically by the monitor.
pub trait MetricProbe: Send + Sync {
    /// The metric kind this probe reports.
    fn kind(&self) -> MetricKind;

    /// Take one observation, or `None` when unobservable right now.
    fn sample(&self) -> BoxFuture<'_, Option<f64>>;
}

/// Probe reporting pool utilization as a fraction of the ceiling.
pub struct PoolUtilizationProbe {
    pool: Arc<DatabasePool>,
}

impl PoolUtilizationProbe {
    /// Create a probe over `pool`.
    pub const fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }
}

impl MetricProbe for PoolUtilizationProbe {
    fn kind(&self) -> MetricKind {
        MetricKind::PoolUtilization
    }

    fn sample(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move {
            let stats = self.pool.stats();
            let max = self.pool.max_connections();
            if max == 0 {
                None
            } else {
                Some(f64::from(stats.active) / f64::from(max))
            }
        })
    }
}

/// Probe reporting the cache hit ratio across both levels.
pub struct CacheHitRatioProbe {
    cache: Arc<MultiLevelCache>,
}

impl CacheHitRatioProbe {
    /// Create a probe over `cache`.
    pub const fn new(cache: Arc<MultiLevelCache>) -> Self {
        Self { cache }
    }
}

impl MetricProbe for CacheHitRatioProbe {
    fn kind(&self) -> MetricKind {
        MetricKind::CacheHitRatio
    }

    fn sample(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move { Some(self.cache.stats().hit_ratio()) })
    }
}

/// Probe reporting the pending queue depth of one topic.
pub struct QueueDepthProbe {
    queue: PriorityQueue,
    topic: String,
}

impl QueueDepthProbe {
    /// Create a probe over `topic` on `queue`.
    pub fn new(queue: PriorityQueue, topic: &str) -> Self {
        Self {
            queue,
            topic: topic.to_owned(),
        }
    }
}

impl MetricProbe for QueueDepthProbe {
    fn kind(&self) -> MetricKind {
        MetricKind::QueueDepth
    }

    fn sample(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move {
            match self.queue.depth(&self.topic).await {
                Ok(depth) => Some(to_f64(depth)),
                Err(e) => {
                    tracing::debug!(topic = %self.topic, error = %e, "Queue depth unobservable");
                    None
                }
            }
        })
    }
}

/// Probe reporting the number of open fan-out sessions.
pub struct OpenSessionsProbe {
    registry: Arc<SessionRegistry>,
}

impl OpenSessionsProbe {
    /// Create a probe over `registry`.
    pub const fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

impl MetricProbe for OpenSessionsProbe {
    fn kind(&self) -> MetricKind {
        MetricKind::OpenSessions
    }

    fn sample(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move { Some(to_f64(self.registry.stats().await.open_sessions as u64)) })
    }
}

/// Probe over an arbitrary synchronous gauge closure.
///
/// Useful in tests and for host-process gauges that do not warrant a
/// dedicated type.
pub struct FnProbe {
    kind: MetricKind,
    gauge: Box<dyn Fn() -> Option<f64> + Send + Sync>,
}

impl FnProbe {
    /// Create a probe reporting `kind` from `gauge`.
    pub fn new(kind: MetricKind, gauge: impl Fn() -> Option<f64> + Send + Sync + 'static) -> Self {
        Self {
            kind,
            gauge: Box::new(gauge),
        }
    }
}

impl MetricProbe for FnProbe {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn sample(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(std::future::ready((self.gauge)()))
    }
}

// Counter magnitudes sit far below the 2^53 exactness bound.
#[allow(clippy::cast_precision_loss)]
fn to_f64(v: u64) -> f64 {
    v as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_probe_reports_the_gauge() {
        let probe = FnProbe::new(MetricKind::ErrorRate, || Some(3.0));
        assert_eq!(probe.kind(), MetricKind::ErrorRate);
        assert_eq!(probe.sample().await, Some(3.0));
    }

    #[tokio::test]
    async fn open_sessions_probe_counts_registrations() {
        let registry = Arc::new(SessionRegistry::new());
        let probe = OpenSessionsProbe::new(Arc::clone(&registry));
        assert_eq!(probe.sample().await, Some(0.0));

        registry
            .register(taskpulse_fanout::SessionHandle::new(4))
            .await;
        assert_eq!(probe.sample().await, Some(1.0));
    }
}
