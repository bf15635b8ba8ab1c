//! Priority message queue for the Taskpulse core.
//!
//! Decouples progress-update producers from the fan-out layer. Messages
//! are persisted in the external Redis-compatible broker before
//! `enqueue` returns, claimed under a visibility lease, and delivered
//! at least once: a claim that is never acknowledged becomes
//! re-claimable when its lease expires, so consumers must be
//! idempotent. The broker is reached only through this crate's
//! claim/ack protocol, never by direct peek.
//!
//! # Ordering
//!
//! Within a topic, a strictly higher priority is always served first
//! even if enqueued later; among equal priorities, earlier enqueue time
//! wins. Starvation of low-priority messages under sustained
//! high-priority load is an accepted trade-off of this contract.
//!
//! # Modules
//!
//! - [`queue`] -- The queue client and claim/ack protocol
//! - [`error`] -- Shared error types

pub mod error;
pub mod queue;

// Re-export primary types for convenience.
pub use error::QueueError;
pub use queue::{PriorityQueue, QueueConfig, QueueDepths};
