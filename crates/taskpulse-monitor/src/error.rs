//! Error types for the monitor layer.

/// Errors that can occur in the monitor layer.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The monitor loops are already running.
    #[error("monitor already started")]
    AlreadyStarted,
}
