//! Metric kinds, samples, and the capped per-kind history.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The metric types the monitor samples.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Pool utilization as a fraction of the connection ceiling.
    PoolUtilization,
    /// Cache hit ratio across both levels.
    CacheHitRatio,
    /// Pending queue depth for the watched topic.
    QueueDepth,
    /// Open fan-out sessions.
    OpenSessions,
    /// p99 operation latency in milliseconds.
    LatencyP99Ms,
    /// Errors per sampled interval.
    ErrorRate,
}

/// One timestamped scalar observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// What was measured.
    pub kind: MetricKind,
    /// The observed value.
    pub value: f64,
    /// When it was observed.
    pub at: DateTime<Utc>,
}

impl MetricSample {
    /// Create a sample observed now.
    pub fn now(kind: MetricKind, value: f64) -> Self {
        Self {
            kind,
            value,
            at: Utc::now(),
        }
    }
}

/// Capped per-kind sample history.
///
/// Each kind keeps at most `limit` samples; the oldest fall off the
/// front. Not internally synchronized; the monitor guards it with a
/// mutex whose critical sections never span an await.
#[derive(Debug)]
pub struct MetricHistory {
    series: BTreeMap<MetricKind, VecDeque<MetricSample>>,
    limit: usize,
}

impl MetricHistory {
    /// Create a history retaining `limit` samples per kind.
    pub fn new(limit: usize) -> Self {
        Self {
            series: BTreeMap::new(),
            limit: limit.max(1),
        }
    }

    /// Append a sample, evicting the oldest past the cap.
    pub fn record(&mut self, sample: MetricSample) {
        let series = self.series.entry(sample.kind).or_default();
        series.push_back(sample);
        while series.len() > self.limit {
            series.pop_front();
        }
    }

    /// The newest sample for `kind`.
    pub fn latest(&self, kind: MetricKind) -> Option<MetricSample> {
        self.series.get(&kind).and_then(|s| s.back()).cloned()
    }

    /// All retained samples for `kind`, oldest first.
    pub fn history(&self, kind: MetricKind) -> Vec<MetricSample> {
        self.series
            .get(&kind)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The newest sample of every kind that has one.
    pub fn all_latest(&self) -> BTreeMap<MetricKind, MetricSample> {
        self.series
            .iter()
            .filter_map(|(kind, s)| s.back().map(|sample| (*kind, sample.clone())))
            .collect()
    }
}
