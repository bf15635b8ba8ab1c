//! Error types for the queue layer.

use taskpulse_types::MessageId;

/// Errors that can occur in the queue layer.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker could not be reached at all. Fatal to
    /// [`PriorityQueue::connect`](crate::queue::PriorityQueue::connect).
    #[error("broker unreachable: {0}")]
    Connectivity(String),

    /// A broker operation failed.
    #[error("broker error: {0}")]
    Backend(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The message body is missing from the broker.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
