//! Cache entries, eviction policies, and write strategies.

use std::time::{Duration, Instant};

use crate::error::CacheError;

/// Policy selecting the victim when a level exceeds its budget.
///
/// Victim selection is deterministic for a given access trace: recency
/// and frequency are tracked with a logical operation counter, and ties
/// break on insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the least recently used entry.
    #[default]
    Lru,
    /// Evict the least frequently used entry.
    Lfu,
    /// Evict the entry closest to TTL expiry.
    Ttl,
    /// Evict the largest entry first.
    SizeBudget,
}

impl EvictionPolicy {
    /// Parse a policy from its configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for anything other than `lru`,
    /// `lfu`, `ttl`, or `size`.
    pub fn parse(s: &str) -> Result<Self, CacheError> {
        match s {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "ttl" => Ok(Self::Ttl),
            "size" => Ok(Self::SizeBudget),
            other => Err(CacheError::Config(format!(
                "unknown eviction_policy: {other}"
            ))),
        }
    }
}

/// Strategy for propagating writes to L2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Block the `put` until L2 acknowledges the write.
    #[default]
    WriteThrough,
    /// Enqueue an asynchronous flush; failures go to the flush-failure
    /// hook, never to the `put` caller.
    WriteBack,
}

impl WriteStrategy {
    /// Parse a strategy from its configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for anything other than
    /// `write_through` or `write_back`.
    pub fn parse(s: &str) -> Result<Self, CacheError> {
        match s {
            "write_through" => Ok(Self::WriteThrough),
            "write_back" => Ok(Self::WriteBack),
            other => Err(CacheError::Config(format!(
                "unknown write_strategy: {other}"
            ))),
        }
    }
}

/// One entry in the L1 store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached JSON value.
    pub value: serde_json::Value,
    /// Serialized size in bytes, counted against the byte budget.
    pub size_bytes: usize,
    /// Wall-clock expiry.
    pub expires_at: Instant,
    /// Logical insertion tick (for deterministic tie-breaking).
    pub inserted_seq: u64,
    /// Logical tick of the most recent access.
    pub last_access_seq: u64,
    /// Number of reads since insertion.
    pub access_count: u64,
    /// Epoch of the key at insertion time; a flush carrying an older
    /// epoch than the key's current one is stale and must be dropped.
    pub epoch: u64,
}

impl CacheEntry {
    /// Create a fresh entry at logical tick `seq`.
    pub fn new(
        value: serde_json::Value,
        size_bytes: usize,
        ttl: Duration,
        seq: u64,
        epoch: u64,
    ) -> Self {
        Self {
            value,
            size_bytes,
            expires_at: Instant::now().checked_add(ttl).unwrap_or_else(Instant::now),
            inserted_seq: seq,
            last_access_seq: seq,
            access_count: 0,
            epoch,
        }
    }

    /// Whether the entry's TTL has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}
