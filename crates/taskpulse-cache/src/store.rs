//! The bounded in-process L1 store with deterministic eviction.
//!
//! Recency and frequency are tracked with a logical operation counter
//! rather than wall-clock time, so the same access trace always selects
//! the same victims. Expired entries are purged before the policy runs;
//! evicting from L1 never touches L2.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::entry::{CacheEntry, EvictionPolicy};

/// The bounded L1 store.
///
/// Not internally synchronized; [`MultiLevelCache`](crate::multi::MultiLevelCache)
/// guards it with a mutex whose critical sections never span an await.
#[derive(Debug)]
pub struct L1Store {
    map: HashMap<String, CacheEntry>,
    epochs: HashMap<String, u64>,
    max_entries: usize,
    max_bytes: usize,
    policy: EvictionPolicy,
    current_bytes: usize,
    seq: u64,
    evictions: u64,
}

impl L1Store {
    /// Create a store bounded by `max_entries` and `max_bytes`.
    pub fn new(max_entries: usize, max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            map: HashMap::new(),
            epochs: HashMap::new(),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            policy,
            current_bytes: 0,
            seq: 0,
            evictions: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.seq = self.seq.saturating_add(1);
        self.seq
    }

    /// Read a value, refreshing its recency and frequency.
    ///
    /// An entry past its TTL is removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        if self.map.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
            return None;
        }
        let seq = self.tick();
        let entry = self.map.get_mut(key)?;
        entry.last_access_seq = seq;
        entry.access_count = entry.access_count.saturating_add(1);
        Some(entry.value.clone())
    }

    /// Insert a value under a freshly bumped epoch, evicting as needed.
    ///
    /// Returns the epoch assigned to the write, which a write-back flush
    /// must carry so stale flushes can be detected.
    pub fn insert(
        &mut self,
        key: &str,
        value: serde_json::Value,
        size_bytes: usize,
        ttl: Duration,
    ) -> u64 {
        let epoch = self.bump_epoch(key);
        self.insert_at_epoch(key, value, size_bytes, ttl, epoch);
        epoch
    }

    /// Insert a value read back from L2 under the key's current epoch.
    ///
    /// Used for backfill on an L2 hit; the value is already durable in
    /// L2, so the epoch must not advance.
    pub fn backfill(
        &mut self,
        key: &str,
        value: serde_json::Value,
        size_bytes: usize,
        ttl: Duration,
    ) {
        let epoch = self.current_epoch(key);
        self.insert_at_epoch(key, value, size_bytes, ttl, epoch);
    }

    fn insert_at_epoch(
        &mut self,
        key: &str,
        value: serde_json::Value,
        size_bytes: usize,
        ttl: Duration,
        epoch: u64,
    ) {
        let seq = self.tick();
        if let Some(old) = self.map.remove(key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes);
        }
        let entry = CacheEntry::new(value, size_bytes, ttl, seq, epoch);
        self.current_bytes = self.current_bytes.saturating_add(size_bytes);
        self.map.insert(key.to_owned(), entry);
        self.evict_to_budget();
    }

    /// Remove an entry. The key's epoch is left untouched; callers that
    /// are invalidating must bump the epoch first.
    pub fn remove(&mut self, key: &str) -> bool {
        if let Some(old) = self.map.remove(key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes);
            true
        } else {
            false
        }
    }

    /// Bump and return the key's epoch.
    pub fn bump_epoch(&mut self, key: &str) -> u64 {
        let next = self.current_epoch(key).saturating_add(1);
        self.epochs.insert(key.to_owned(), next);
        next
    }

    /// The key's current epoch (0 when never written).
    pub fn current_epoch(&self, key: &str) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total payload bytes held.
    pub const fn bytes(&self) -> usize {
        self.current_bytes
    }

    /// Entries evicted by policy since construction.
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }

    fn over_budget(&self) -> bool {
        self.map.len() > self.max_entries || self.current_bytes > self.max_bytes
    }

    fn evict_to_budget(&mut self) {
        if !self.over_budget() {
            return;
        }

        // Expired entries go first regardless of policy.
        let now = Instant::now();
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }

        while self.over_budget() {
            let Some(victim) = self.victim_key() else {
                return;
            };
            self.remove(&victim);
            self.evictions = self.evictions.saturating_add(1);
            tracing::trace!(key = %victim, policy = ?self.policy, "Evicted L1 entry");
        }
    }

    /// Select the policy victim. Ties break on insertion order, then on
    /// the key itself, so selection is a pure function of the trace.
    fn victim_key(&self) -> Option<String> {
        let policy = self.policy;
        self.map
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                let primary = match policy {
                    EvictionPolicy::Lru => a.last_access_seq.cmp(&b.last_access_seq),
                    EvictionPolicy::Lfu => a.access_count.cmp(&b.access_count),
                    EvictionPolicy::Ttl => a.expires_at.cmp(&b.expires_at),
                    EvictionPolicy::SizeBudget => b.size_bytes.cmp(&a.size_bytes),
                };
                primary
                    .then_with(|| a.inserted_seq.cmp(&b.inserted_seq))
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store(policy: EvictionPolicy, max_entries: usize) -> L1Store {
        L1Store::new(max_entries, usize::MAX, policy)
    }

    #[test]
    fn lru_evicts_the_oldest_untouched_key() {
        let mut s = store(EvictionPolicy::Lru, 2);
        s.insert("a", serde_json::json!(1), 1, TTL);
        s.insert("b", serde_json::json!(2), 1, TTL);
        s.insert("c", serde_json::json!(3), 1, TTL);

        assert!(s.get("a").is_none(), "a should have been evicted");
        assert!(s.get("b").is_some());
        assert!(s.get("c").is_some());
        assert_eq!(s.evictions(), 1);
    }

    #[test]
    fn lru_get_refreshes_recency() {
        let mut s = store(EvictionPolicy::Lru, 2);
        s.insert("a", serde_json::json!(1), 1, TTL);
        s.insert("b", serde_json::json!(2), 1, TTL);
        // Touch a so b becomes the LRU victim.
        let _ = s.get("a");
        s.insert("c", serde_json::json!(3), 1, TTL);

        assert!(s.get("a").is_some());
        assert!(s.get("b").is_none());
    }

    #[test]
    fn lfu_evicts_the_least_read_key() {
        let mut s = store(EvictionPolicy::Lfu, 2);
        s.insert("a", serde_json::json!(1), 1, TTL);
        s.insert("b", serde_json::json!(2), 1, TTL);
        let _ = s.get("a");
        let _ = s.get("a");
        let _ = s.get("b");
        s.insert("c", serde_json::json!(3), 1, TTL);

        // c was never read, but b has fewer reads than a; the fresh
        // insert itself pushes the store over budget, and c (0 reads,
        // newest) is the least frequently used.
        assert!(s.get("c").is_none());
        assert!(s.get("a").is_some());
        assert!(s.get("b").is_some());
    }

    #[test]
    fn byte_budget_triggers_eviction() {
        let mut s = L1Store::new(100, 10, EvictionPolicy::Lru);
        s.insert("a", serde_json::json!("xxxx"), 6, TTL);
        s.insert("b", serde_json::json!("xxxx"), 6, TTL);
        assert_eq!(s.len(), 1, "12 bytes exceeds the 10-byte budget");
        assert!(s.bytes() <= 10);
    }

    #[test]
    fn size_policy_evicts_largest_first() {
        let mut s = store(EvictionPolicy::SizeBudget, 2);
        s.insert("small", serde_json::json!(1), 1, TTL);
        s.insert("big", serde_json::json!(2), 100, TTL);
        s.insert("mid", serde_json::json!(3), 10, TTL);

        assert!(s.get("big").is_none());
        assert!(s.get("small").is_some());
        assert!(s.get("mid").is_some());
    }

    #[test]
    fn expired_entries_miss_and_vanish() {
        let mut s = store(EvictionPolicy::Lru, 10);
        s.insert("gone", serde_json::json!(1), 1, Duration::ZERO);
        assert!(s.get("gone").is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn insert_bumps_epoch_and_backfill_does_not() {
        let mut s = store(EvictionPolicy::Lru, 10);
        assert_eq!(s.current_epoch("k"), 0);

        let e1 = s.insert("k", serde_json::json!(1), 1, TTL);
        assert_eq!(e1, 1);
        let e2 = s.insert("k", serde_json::json!(2), 1, TTL);
        assert_eq!(e2, 2);

        s.backfill("k", serde_json::json!(3), 1, TTL);
        assert_eq!(s.current_epoch("k"), 2);
    }

    #[test]
    fn epoch_survives_removal() {
        let mut s = store(EvictionPolicy::Lru, 10);
        s.insert("k", serde_json::json!(1), 1, TTL);
        s.bump_epoch("k");
        s.remove("k");
        // A delayed flush for epoch 1 must still be detectable as stale.
        assert_eq!(s.current_epoch("k"), 2);
    }

    #[test]
    fn deterministic_tie_break_on_key() {
        // Two untouched entries with identical metrics: the smaller key
        // is selected, every time.
        for _ in 0..10 {
            let mut s = store(EvictionPolicy::Lfu, 2);
            s.insert("x", serde_json::json!(1), 1, TTL);
            s.insert("y", serde_json::json!(2), 1, TTL);
            // Equalize insertion-order tiebreak by reading both once in
            // the same order.
            let _ = s.get("x");
            let _ = s.get("y");
            s.insert("z", serde_json::json!(3), 1, TTL);
            assert!(s.get("z").is_none(), "z has zero reads and loses LFU");
        }
    }
}
