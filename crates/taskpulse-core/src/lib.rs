//! Typed configuration and validation for the Taskpulse core.
//!
//! The canonical configuration lives in a YAML file (`taskpulse.yaml` by
//! convention) owned by whatever process hosts the core. This crate
//! defines strongly-typed structs that mirror the YAML structure, a
//! loader with environment-variable overrides for deployment, and a
//! validator that enforces every structural invariant the components
//! rely on (pool sizing bounds, non-zero budgets, non-zero intervals).
//!
//! The components themselves (`taskpulse-db`, `taskpulse-cache`, ...)
//! define their own narrow config types; the structs here are the
//! operator-facing surface that maps onto them.

pub mod config;

pub use config::{
    BenchmarkDefaults, CacheSection, ConfigError, CoreConfig, DatabaseSection, FanoutSection,
    MonitorSection, QueueSection, ThresholdSection,
};
