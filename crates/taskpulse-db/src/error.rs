//! Error types for the database layer.
//!
//! The taxonomy distinguishes connectivity failures (fatal to
//! initialization, retried by the caller with backoff) from timeouts
//! (recoverable) and from per-query failures (contained and counted).

/// Errors that can occur in the database layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The database could not be reached at all. Fatal to
    /// [`DatabasePool::initialize`](crate::pool::DatabasePool::initialize).
    #[error("database unreachable: {0}")]
    Connectivity(String),

    /// An operation exceeded its deadline. Recoverable; the caller may
    /// retry.
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// The operation that timed out (`acquire`, `query`, ...).
        operation: &'static str,
        /// The deadline that was exceeded, in milliseconds.
        millis: u64,
    },

    /// The pool has been closed; acquisitions fail until it is
    /// initialized again.
    #[error("pool is closed")]
    Closed,

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The named pool is not registered with the manager.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
}
