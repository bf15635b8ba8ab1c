//! Performance monitor and benchmark suite for the Taskpulse core.
//!
//! The monitor runs two independent periodic loops -- a resource
//! sampler and an alert evaluator -- as cancellable scheduled tasks
//! with an explicit start/stop lifecycle. It is pure observation: the
//! probes read statistics snapshots from the pool, cache, queue, and
//! fan-out components and never mutate them. The benchmark suite
//! drives synthetic load against one target and always produces a
//! report, even when the run fails its error budget or is cancelled
//! mid-flight.
//!
//! # Modules
//!
//! - [`metrics`] -- Metric kinds, samples, and the capped history
//! - [`alerts`] -- Alert store and threshold evaluation
//! - [`probes`] -- Ready-made probes over the four core components
//! - [`monitor`] -- The sampler/evaluator loops and their lifecycle
//! - [`bench`] -- The synthetic load driver and report types
//! - [`error`] -- Shared error types

pub mod alerts;
pub mod bench;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod probes;

// Re-export primary types for convenience.
pub use alerts::{Alert, AlertSeverity, AlertStore, Thresholds};
pub use bench::{
    BenchStatus, BenchmarkConfig, BenchmarkReport, FnTarget, HttpTarget, LatencySummary,
    LoadTarget, run_benchmark,
};
pub use error::MonitorError;
pub use metrics::{MetricHistory, MetricKind, MetricSample};
pub use monitor::{MonitorConfig, PerformanceMonitor};
pub use probes::{
    CacheHitRatioProbe, FnProbe, MetricProbe, OpenSessionsProbe, PoolUtilizationProbe,
    QueueDepthProbe,
};
