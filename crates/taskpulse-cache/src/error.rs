//! Error types for the cache layer.

/// Errors that can occur in the cache layer.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The L2 service could not be reached at all. Fatal to
    /// [`RemoteCache::connect`](crate::remote::RemoteCache::connect).
    #[error("cache service unreachable: {0}")]
    Connectivity(String),

    /// An L2 operation failed.
    #[error("cache backend error: {0}")]
    Backend(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
