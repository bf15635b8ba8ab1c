//! Alert store and threshold evaluation.
//!
//! Alerts are derived from metric samples crossing configured
//! thresholds. They are append-only until acknowledged and the store is
//! capped, newest first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use taskpulse_types::AlertId;

use crate::metrics::{MetricKind, MetricSample};

/// Maximum alerts to keep in memory.
const MAX_ALERTS: usize = 500;

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational -- a notable observation that does not require
    /// action.
    Info,
    /// Warning -- something is off but not critical.
    Warning,
    /// Critical -- immediate attention required.
    Critical,
}

/// A single alert raised by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier.
    pub id: AlertId,
    /// Severity of the alert.
    pub severity: AlertSeverity,
    /// The metric that crossed its threshold.
    pub metric: MetricKind,
    /// The observed value.
    pub value: f64,
    /// The configured threshold it crossed.
    pub threshold: f64,
    /// Human-readable message.
    pub message: String,
    /// Whether an operator has acknowledged this alert.
    pub acknowledged: bool,
    /// ISO 8601 timestamp when the alert was created.
    pub created_at: String,
}

/// In-memory alert store, newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertStore {
    alerts: Vec<Alert>,
}

impl AlertStore {
    /// Create a new empty alert store.
    pub const fn new() -> Self {
        Self { alerts: Vec::new() }
    }

    /// Add an alert to the store.
    ///
    /// If the store exceeds [`MAX_ALERTS`], the oldest alerts are
    /// removed.
    pub fn push(&mut self, alert: Alert) {
        self.alerts.insert(0, alert);
        if self.alerts.len() > MAX_ALERTS {
            self.alerts.truncate(MAX_ALERTS);
        }
    }

    /// Get all alerts, newest first.
    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    /// Acknowledge an alert by ID.
    ///
    /// Returns `true` if the alert was found and acknowledged, `false`
    /// if the ID was not found.
    pub fn acknowledge(&mut self, id: AlertId) -> bool {
        for alert in &mut self.alerts {
            if alert.id == id {
                alert.acknowledged = true;
                return true;
            }
        }
        false
    }

    /// Get unacknowledged alerts.
    pub fn unacknowledged(&self) -> Vec<&Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged).collect()
    }

    /// Create and push a new alert.
    pub fn raise(
        &mut self,
        severity: AlertSeverity,
        metric: MetricKind,
        value: f64,
        threshold: f64,
        message: String,
    ) {
        let alert = Alert {
            id: AlertId::new(),
            severity,
            metric,
            value,
            threshold,
            message,
            acknowledged: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.push(alert);
    }
}

/// Alert thresholds evaluated against the newest sample per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Pool utilization fraction above which an alert is raised.
    pub pool_utilization_max: f64,
    /// Cache hit ratio below which an alert is raised.
    pub cache_hit_ratio_min: f64,
    /// Pending queue depth above which an alert is raised.
    pub queue_depth_max: f64,
    /// p99 latency in milliseconds above which an alert is raised.
    pub latency_p99_max_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pool_utilization_max: 0.9,
            cache_hit_ratio_min: 0.5,
            queue_depth_max: 10_000.0,
            latency_p99_max_ms: 500.0,
        }
    }
}

/// Check the newest samples against the thresholds, raising alerts
/// into `store`.
///
/// Intended to be called by the evaluator loop on its own interval. A
/// kind with no sample yet raises nothing.
pub fn evaluate_thresholds(
    latest: &BTreeMap<MetricKind, MetricSample>,
    thresholds: &Thresholds,
    store: &mut AlertStore,
) {
    if let Some(sample) = latest.get(&MetricKind::PoolUtilization)
        && sample.value > thresholds.pool_utilization_max
    {
        store.raise(
            AlertSeverity::Critical,
            MetricKind::PoolUtilization,
            sample.value,
            thresholds.pool_utilization_max,
            format!(
                "pool utilization {:.0}% above {:.0}%",
                sample.value * 100.0,
                thresholds.pool_utilization_max * 100.0
            ),
        );
    }

    if let Some(sample) = latest.get(&MetricKind::CacheHitRatio)
        && sample.value < thresholds.cache_hit_ratio_min
    {
        store.raise(
            AlertSeverity::Warning,
            MetricKind::CacheHitRatio,
            sample.value,
            thresholds.cache_hit_ratio_min,
            format!(
                "cache hit ratio {:.0}% below {:.0}%",
                sample.value * 100.0,
                thresholds.cache_hit_ratio_min * 100.0
            ),
        );
    }

    if let Some(sample) = latest.get(&MetricKind::QueueDepth)
        && sample.value > thresholds.queue_depth_max
    {
        store.raise(
            AlertSeverity::Warning,
            MetricKind::QueueDepth,
            sample.value,
            thresholds.queue_depth_max,
            format!(
                "queue depth {} above {}",
                sample.value, thresholds.queue_depth_max
            ),
        );
    }

    if let Some(sample) = latest.get(&MetricKind::LatencyP99Ms)
        && sample.value > thresholds.latency_p99_max_ms
    {
        store.raise(
            AlertSeverity::Critical,
            MetricKind::LatencyP99Ms,
            sample.value,
            thresholds.latency_p99_max_ms,
            format!(
                "p99 latency {:.1}ms above {:.1}ms",
                sample.value, thresholds.latency_p99_max_ms
            ),
        );
    }
}
