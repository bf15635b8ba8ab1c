//! The sampler/evaluator loops and their lifecycle.
//!
//! Two independent periodic loops run on their own intervals: the
//! sampler polls every registered probe and records the observations,
//! and the evaluator checks the newest sample per kind against the
//! thresholds. Both are cancellable scheduled tasks: `start` spawns
//! them with a watch-channel shutdown token and `stop` flips the token
//! and awaits them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use taskpulse_types::AlertId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::alerts::{Alert, AlertStore, Thresholds, evaluate_thresholds};
use crate::error::MonitorError;
use crate::metrics::{MetricHistory, MetricKind, MetricSample};
use crate::probes::MetricProbe;

/// Configuration for the monitor loops.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between resource samples.
    pub sample_interval: Duration,
    /// Interval between alert evaluations.
    pub alert_interval: Duration,
    /// Samples retained per metric kind.
    pub history_limit: usize,
    /// Alert thresholds.
    pub thresholds: Thresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            alert_interval: Duration::from_secs(15),
            history_limit: 720,
            thresholds: Thresholds::default(),
        }
    }
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The performance monitor.
///
/// Pure observation: probes read statistics snapshots and never mutate
/// the components they watch.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    probes: Mutex<Vec<Arc<dyn MetricProbe>>>,
    history: Arc<Mutex<MetricHistory>>,
    alerts: Arc<Mutex<AlertStore>>,
    loops: Mutex<Vec<LoopHandle>>,
}

impl PerformanceMonitor {
    /// Create a monitor with no probes registered.
    pub fn new(config: MonitorConfig) -> Self {
        let history_limit = config.history_limit;
        Self {
            config,
            probes: Mutex::new(Vec::new()),
            history: Arc::new(Mutex::new(MetricHistory::new(history_limit))),
            alerts: Arc::new(Mutex::new(AlertStore::new())),
            loops: Mutex::new(Vec::new()),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a probe. Takes effect at the next `start`.
    pub fn register_probe(&self, probe: Arc<dyn MetricProbe>) {
        Self::lock(&self.probes).push(probe);
    }

    /// Record a sample directly, outside the sampler loop.
    ///
    /// Used by components that push observations (e.g. benchmark
    /// latency percentiles) rather than being polled.
    pub fn record(&self, kind: MetricKind, value: f64) {
        Self::lock(&self.history).record(MetricSample::now(kind, value));
    }

    /// The newest sample for `kind`.
    pub fn latest(&self, kind: MetricKind) -> Option<MetricSample> {
        Self::lock(&self.history).latest(kind)
    }

    /// All retained samples for `kind`, oldest first.
    pub fn history_for(&self, kind: MetricKind) -> Vec<MetricSample> {
        Self::lock(&self.history).history(kind)
    }

    /// All alerts, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        Self::lock(&self.alerts).all().to_vec()
    }

    /// Acknowledge an alert by id.
    pub fn acknowledge(&self, id: AlertId) -> bool {
        Self::lock(&self.alerts).acknowledge(id)
    }

    /// Start the sampler and evaluator loops.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::AlreadyStarted`] when the loops are
    /// running.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut loops = Self::lock(&self.loops);
        if !loops.is_empty() {
            return Err(MonitorError::AlreadyStarted);
        }

        let probes: Vec<Arc<dyn MetricProbe>> = Self::lock(&self.probes).clone();

        // Sampler loop.
        let (sampler_tx, sampler_rx) = watch::channel(false);
        let sampler = tokio::spawn(run_sampler(
            probes,
            Arc::clone(&self.history),
            self.config.sample_interval,
            sampler_rx,
        ));
        loops.push(LoopHandle {
            shutdown: sampler_tx,
            handle: sampler,
        });

        // Evaluator loop.
        let (evaluator_tx, evaluator_rx) = watch::channel(false);
        let evaluator = tokio::spawn(run_evaluator(
            Arc::clone(&self.history),
            Arc::clone(&self.alerts),
            self.config.thresholds.clone(),
            self.config.alert_interval,
            evaluator_rx,
        ));
        loops.push(LoopHandle {
            shutdown: evaluator_tx,
            handle: evaluator,
        });

        info!(
            sample_interval = ?self.config.sample_interval,
            alert_interval = ?self.config.alert_interval,
            "Performance monitor started"
        );
        Ok(())
    }

    /// Stop both loops and wait for them to exit.
    ///
    /// Safe to call when not started.
    pub async fn stop(&self) {
        let drained: Vec<LoopHandle> = {
            let mut loops = Self::lock(&self.loops);
            loops.drain(..).collect()
        };
        for entry in drained {
            let _ = entry.shutdown.send(true);
            if entry.handle.await.is_err() {
                tracing::warn!("Monitor loop ended abnormally");
            }
        }
        info!("Performance monitor stopped");
    }

    /// Whether the loops are currently running.
    pub fn is_running(&self) -> bool {
        !Self::lock(&self.loops).is_empty()
    }
}

async fn run_sampler(
    probes: Vec<Arc<dyn MetricProbe>>,
    history: Arc<Mutex<MetricHistory>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                for probe in &probes {
                    if let Some(value) = probe.sample().await {
                        let sample = MetricSample::now(probe.kind(), value);
                        history
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record(sample);
                    }
                }
            }
        }
    }
}

async fn run_evaluator(
    history: Arc<Mutex<MetricHistory>>,
    alerts: Arc<Mutex<AlertStore>>,
    thresholds: Thresholds,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let latest = history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .all_latest();
                let mut store = alerts.lock().unwrap_or_else(PoisonError::into_inner);
                evaluate_thresholds(&latest, &thresholds, &mut store);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::FnProbe;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(20),
            alert_interval: Duration::from_millis(20),
            history_limit: 64,
            thresholds: Thresholds::default(),
        }
    }

    #[tokio::test]
    async fn sampler_records_probe_observations() {
        let monitor = PerformanceMonitor::new(fast_config());
        monitor.register_probe(Arc::new(FnProbe::new(MetricKind::OpenSessions, || {
            Some(7.0)
        })));

        monitor.start().ok();
        tokio::time::sleep(Duration::from_millis(120)).await;
        monitor.stop().await;

        let latest = monitor.latest(MetricKind::OpenSessions);
        assert_eq!(latest.map(|s| s.value), Some(7.0));
        assert!(!monitor.history_for(MetricKind::OpenSessions).is_empty());
    }

    #[tokio::test]
    async fn evaluator_raises_on_threshold_crossing() {
        let monitor = PerformanceMonitor::new(fast_config());
        monitor.register_probe(Arc::new(FnProbe::new(MetricKind::PoolUtilization, || {
            Some(0.99)
        })));

        monitor.start().ok();
        tokio::time::sleep(Duration::from_millis(150)).await;
        monitor.stop().await;

        let alerts = monitor.alerts();
        assert!(
            alerts.iter().any(|a| a.metric == MetricKind::PoolUtilization),
            "expected a pool utilization alert, got {alerts:?}"
        );
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let monitor = PerformanceMonitor::new(fast_config());
        assert!(monitor.start().is_ok());
        assert!(matches!(
            monitor.start(),
            Err(MonitorError::AlreadyStarted)
        ));
        monitor.stop().await;
        assert!(!monitor.is_running());

        // After a stop the monitor can start again.
        assert!(monitor.start().is_ok());
        monitor.stop().await;
    }

    #[tokio::test]
    async fn manual_records_are_visible() {
        let monitor = PerformanceMonitor::new(fast_config());
        monitor.record(MetricKind::LatencyP99Ms, 12.5);
        assert_eq!(
            monitor.latest(MetricKind::LatencyP99Ms).map(|s| s.value),
            Some(12.5)
        );
    }

    #[tokio::test]
    async fn acknowledge_round_trip() {
        let monitor = PerformanceMonitor::new(fast_config());
        monitor.register_probe(Arc::new(FnProbe::new(MetricKind::QueueDepth, || {
            Some(1_000_000.0)
        })));
        monitor.start().ok();
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop().await;

        let first = monitor.alerts().into_iter().next();
        let Some(alert) = first else {
            panic!("expected at least one queue depth alert");
        };
        assert!(monitor.acknowledge(alert.id));
        assert!(!monitor.acknowledge(AlertId::new()));
    }
}
