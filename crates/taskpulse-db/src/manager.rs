//! Registry of named pools with batch lifecycle operations.
//!
//! The original design kept a module-level manager singleton; here the
//! registry is an explicitly constructed object passed to whatever
//! process owns application lifetime. Initialize and shutdown are
//! lifecycle methods on the registry, not ambient global state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::PoolConfig;
use crate::error::DbError;
use crate::pool::{DatabasePool, HealthReport};
use crate::stats::PoolStats;

/// Registry of named connection pools (e.g. `primary`, `reporting`).
#[derive(Default)]
pub struct PoolManager {
    pools: RwLock<BTreeMap<String, Arc<DatabasePool>>>,
}

impl PoolManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize a pool under `name` and register it.
    ///
    /// Replaces (and closes) any pool previously registered under the
    /// same name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the pool cannot be initialized; the
    /// registry is left unchanged in that case.
    pub async fn initialize(
        &self,
        name: &str,
        config: &PoolConfig,
    ) -> Result<Arc<DatabasePool>, DbError> {
        let pool = Arc::new(DatabasePool::initialize(config).await?);
        let previous = {
            let mut pools = self.pools.write().await;
            pools.insert(name.to_owned(), Arc::clone(&pool))
        };
        if let Some(old) = previous {
            old.close().await;
            tracing::warn!(name, "Replaced an existing pool registration");
        }
        Ok(pool)
    }

    /// Look up a pool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<DatabasePool>> {
        self.pools.read().await.get(name).cloned()
    }

    /// Look up a pool by name, erroring when it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownPool`] for an unregistered name.
    pub async fn require(&self, name: &str) -> Result<Arc<DatabasePool>, DbError> {
        self.get(name)
            .await
            .ok_or_else(|| DbError::UnknownPool(name.to_owned()))
    }

    /// The registered pool names, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }

    /// Health-check every registered pool.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthReport> {
        let pools: Vec<(String, Arc<DatabasePool>)> = {
            let guard = self.pools.read().await;
            guard
                .iter()
                .map(|(name, pool)| (name.clone(), Arc::clone(pool)))
                .collect()
        };

        let mut reports = BTreeMap::new();
        for (name, pool) in pools {
            reports.insert(name, pool.health_check().await);
        }
        reports
    }

    /// Snapshot statistics for every registered pool.
    pub async fn stats_all(&self) -> BTreeMap<String, PoolStats> {
        let guard = self.pools.read().await;
        guard
            .iter()
            .map(|(name, pool)| (name.clone(), pool.stats()))
            .collect()
    }

    /// Close every registered pool and clear the registry.
    pub async fn close_all(&self) {
        let pools: Vec<(String, Arc<DatabasePool>)> = {
            let mut guard = self.pools.write().await;
            let drained: Vec<_> = guard
                .iter()
                .map(|(name, pool)| (name.clone(), Arc::clone(pool)))
                .collect();
            guard.clear();
            drained
        };

        for (name, pool) in pools {
            pool.close().await;
            tracing::info!(name, "Pool closed by manager shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_registry_has_no_pools() {
        let manager = PoolManager::new();
        assert!(manager.names().await.is_empty());
        assert!(manager.get("primary").await.is_none());
    }

    #[tokio::test]
    async fn require_unknown_pool_errors() {
        let manager = PoolManager::new();
        let result = manager.require("reporting").await;
        assert!(matches!(result, Err(DbError::UnknownPool(name)) if name == "reporting"));
    }

    #[tokio::test]
    async fn health_check_all_on_empty_registry() {
        let manager = PoolManager::new();
        assert!(manager.health_check_all().await.is_empty());
        assert!(manager.stats_all().await.is_empty());
    }
}
