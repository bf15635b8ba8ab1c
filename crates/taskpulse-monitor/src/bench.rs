//! The synthetic load driver and report types.
//!
//! A benchmark run drives one [`LoadTarget`] with a configurable worker
//! count, duration, warm-up/cool-down windows, and target rate, and
//! reports throughput, latency percentiles, and error counts. A run
//! that exceeds its error budget is marked failed but still produces a
//! full report; a run cancelled mid-flight still emits a partial
//! report. A report is always produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// One operation against a benchmark target.
///
/// The four standard targets map onto this trait as follows: the HTTP
/// API via [`HttpTarget`], and the database/cache/fan-out targets via
/// [`FnTarget`] closures the host process builds over its own pool,
/// cache, and observer-client handles.
pub trait LoadTarget: Send + Sync {
    /// Perform one operation, erring on any failure.
    fn call(&self) -> BoxFuture<'_, Result<(), anyhow::Error>>;
}

/// Benchmark target issuing GET requests against one URL.
pub struct HttpTarget {
    client: reqwest::Client,
    url: String,
}

impl HttpTarget {
    /// Create a target for `url`.
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_owned(),
        }
    }
}

impl LoadTarget for HttpTarget {
    fn call(&self) -> BoxFuture<'_, Result<(), anyhow::Error>> {
        Box::pin(async move {
            let response = self.client.get(&self.url).send().await?;
            response.error_for_status()?;
            Ok(())
        })
    }
}

/// Benchmark target over an arbitrary async closure.
pub struct FnTarget {
    op: Box<dyn Fn() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync>,
}

impl FnTarget {
    /// Create a target from `op`.
    pub fn new(
        op: impl Fn() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync + 'static,
    ) -> Self {
        Self { op: Box::new(op) }
    }
}

impl LoadTarget for FnTarget {
    fn call(&self) -> BoxFuture<'_, Result<(), anyhow::Error>> {
        (self.op)()
    }
}

/// Outcome of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchStatus {
    /// Completed within the error budget.
    Passed,
    /// Completed but exceeded the error budget.
    Failed,
    /// Stopped mid-flight; the report covers the work done so far.
    Cancelled,
}

/// Configuration for one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Run name carried into the report.
    pub name: String,
    /// Measured run duration.
    pub duration: Duration,
    /// Concurrent workers driving load.
    pub concurrency: usize,
    /// Target operations per second across all workers (0 = unthrottled).
    pub target_rate: u64,
    /// Warm-up window excluded from the report.
    pub warmup: Duration,
    /// Cool-down window after the measured run.
    pub cooldown: Duration,
    /// Error budget; exceeding it marks the run failed.
    pub max_errors: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            name: String::from("benchmark"),
            duration: Duration::from_secs(30),
            concurrency: 8,
            target_rate: 0,
            warmup: Duration::from_secs(5),
            cooldown: Duration::from_secs(2),
            max_errors: 100,
        }
    }
}

/// Latency percentiles over the measured window, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Median latency.
    pub p50_ms: f64,
    /// 95th percentile latency.
    pub p95_ms: f64,
    /// 99th percentile latency.
    pub p99_ms: f64,
    /// Worst observed latency.
    pub max_ms: f64,
    /// Mean latency.
    pub mean_ms: f64,
}

/// Aggregated result of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Run name from the configuration.
    pub name: String,
    /// Outcome.
    pub status: BenchStatus,
    /// Whether the run stopped before its configured duration.
    pub partial: bool,
    /// Successful operations in the measured window.
    pub operations: u64,
    /// Failed operations in the measured window.
    pub errors: u64,
    /// Wall-clock time of the measured window.
    pub elapsed: Duration,
    /// Successful operations per second.
    pub throughput_ops_sec: f64,
    /// Latency percentiles over successful operations.
    pub latency: LatencySummary,
}

/// Drive `target` per `config` and report.
///
/// Pass `cancel` to allow stopping the run mid-flight; a cancelled run
/// still reports everything measured up to that point.
pub async fn run_benchmark(
    config: &BenchmarkConfig,
    target: Arc<dyn LoadTarget>,
    cancel: Option<watch::Receiver<bool>>,
) -> BenchmarkReport {
    info!(
        name = %config.name,
        concurrency = config.concurrency,
        duration = ?config.duration,
        "Benchmark starting"
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    if let Some(mut rx) = cancel {
        let flag = Arc::clone(&cancelled);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    flag.store(true, Ordering::Release);
                    break;
                }
            }
        });
    }

    // Warm-up window: drive load, discard measurements.
    if !config.warmup.is_zero() && !cancelled.load(Ordering::Acquire) {
        let _ = drive(
            config.warmup,
            config.concurrency,
            config.target_rate,
            Arc::clone(&target),
            Arc::clone(&cancelled),
        )
        .await;
    }

    // Measured window.
    let started = Instant::now();
    let (latencies, errors) = drive(
        config.duration,
        config.concurrency,
        config.target_rate,
        Arc::clone(&target),
        Arc::clone(&cancelled),
    )
    .await;
    let elapsed = started.elapsed();

    let was_cancelled = cancelled.load(Ordering::Acquire);
    if !config.cooldown.is_zero() && !was_cancelled {
        tokio::time::sleep(config.cooldown).await;
    }

    let operations = u64::try_from(latencies.len()).unwrap_or(u64::MAX);
    let status = if was_cancelled {
        BenchStatus::Cancelled
    } else if errors > config.max_errors {
        BenchStatus::Failed
    } else {
        BenchStatus::Passed
    };

    let report = BenchmarkReport {
        name: config.name.clone(),
        status,
        partial: was_cancelled,
        operations,
        errors,
        elapsed,
        throughput_ops_sec: throughput(operations, elapsed),
        latency: summarize(latencies),
    };

    match report.status {
        BenchStatus::Passed => info!(
            name = %report.name,
            ops = report.operations,
            throughput = report.throughput_ops_sec,
            p99_ms = report.latency.p99_ms,
            "Benchmark passed"
        ),
        BenchStatus::Failed => warn!(
            name = %report.name,
            errors = report.errors,
            budget = config.max_errors,
            "Benchmark exceeded its error budget"
        ),
        BenchStatus::Cancelled => info!(name = %report.name, "Benchmark cancelled"),
    }
    report
}

/// Run `concurrency` workers against `target` for `duration`.
///
/// Returns the successful-operation latencies in microseconds and the
/// error count.
async fn drive(
    duration: Duration,
    concurrency: usize,
    target_rate: u64,
    target: Arc<dyn LoadTarget>,
    cancelled: Arc<AtomicBool>,
) -> (Vec<u64>, u64) {
    let pace = worker_pace(concurrency, target_rate);
    let deadline = Instant::now() + duration;

    let mut workers = Vec::with_capacity(concurrency.max(1));
    for _ in 0..concurrency.max(1) {
        let target = Arc::clone(&target);
        let cancelled = Arc::clone(&cancelled);
        workers.push(tokio::spawn(async move {
            let mut latencies: Vec<u64> = Vec::new();
            let mut errors = 0u64;

            // Stagger worker starts so a paced fleet does not fire in
            // lockstep.
            if let Some(pace) = pace {
                let jitter_ms = rand::rng().random_range(0..pace.as_millis().max(1));
                tokio::time::sleep(Duration::from_millis(
                    u64::try_from(jitter_ms).unwrap_or(0),
                ))
                .await;
            }

            while Instant::now() < deadline && !cancelled.load(Ordering::Acquire) {
                let started = Instant::now();
                match target.call().await {
                    Ok(()) => {
                        let micros =
                            u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
                        latencies.push(micros);
                    }
                    Err(e) => {
                        errors = errors.saturating_add(1);
                        tracing::trace!(error = %e, "Benchmark operation failed");
                    }
                }

                if let Some(pace) = pace {
                    let spent = started.elapsed();
                    if let Some(rest) = pace.checked_sub(spent) {
                        tokio::time::sleep(rest).await;
                    }
                }
            }
            (latencies, errors)
        }));
    }

    let mut all_latencies: Vec<u64> = Vec::new();
    let mut total_errors = 0u64;
    for worker in workers {
        match worker.await {
            Ok((latencies, errors)) => {
                all_latencies.extend(latencies);
                total_errors = total_errors.saturating_add(errors);
            }
            Err(e) => {
                warn!(error = %e, "Benchmark worker panicked");
            }
        }
    }
    (all_latencies, total_errors)
}

/// Per-worker delay between operations for a fleet-wide target rate.
fn worker_pace(concurrency: usize, target_rate: u64) -> Option<Duration> {
    if target_rate == 0 {
        return None;
    }
    let concurrency = u64::try_from(concurrency.max(1)).unwrap_or(1);
    // Each worker fires target_rate / concurrency times per second.
    let micros = concurrency.saturating_mul(1_000_000) / target_rate.max(1);
    Some(Duration::from_micros(micros))
}

#[allow(clippy::cast_precision_loss)]
fn throughput(operations: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        operations as f64 / secs
    }
}

/// Summarize latencies (microseconds in, milliseconds out) using the
/// nearest-rank percentile method.
#[allow(clippy::cast_precision_loss)]
fn summarize(mut latencies: Vec<u64>) -> LatencySummary {
    if latencies.is_empty() {
        return LatencySummary::default();
    }
    latencies.sort_unstable();

    let sum: u128 = latencies.iter().map(|v| u128::from(*v)).sum();
    let mean_micros = sum / u128::try_from(latencies.len()).unwrap_or(1).max(1);

    LatencySummary {
        p50_ms: micros_to_ms(percentile(&latencies, 0.50)),
        p95_ms: micros_to_ms(percentile(&latencies, 0.95)),
        p99_ms: micros_to_ms(percentile(&latencies, 0.99)),
        max_ms: micros_to_ms(latencies.last().copied().unwrap_or(0)),
        mean_ms: micros_to_ms(u64::try_from(mean_micros).unwrap_or(u64::MAX)),
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted.get(rank.saturating_sub(1)).copied().unwrap_or(0)
}

#[allow(clippy::cast_precision_loss)]
fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}
