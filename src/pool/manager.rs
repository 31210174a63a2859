//! C5: `PoolManager` — an LRU-bounded map of [`PerOriginPool`]s (§4.5).
//!
//! A manual LRU over a recency deque rather than a pulled-in LRU crate,
//! generalizing the flat `Mutex<HashMap<PoolKey, Vec<Connection>>>` shape
//! used for a single-level pool elsewhere in this ecosystem to the
//! two-level per-origin-pool-of-connections structure this core needs.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::pool::key::PoolKey;
use crate::pool::origin::{ConnConfig, PerOriginPool};

pub struct PoolManager {
    pools: DashMap<PoolKey, Arc<PerOriginPool>>,
    /// Front = least recently used.
    order: Mutex<VecDeque<PoolKey>>,
    num_pools: usize,
    default_config: ConnConfig,
}

impl PoolManager {
    pub fn new(num_pools: usize, default_config: ConnConfig) -> Self {
        Self {
            pools: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            num_pools,
            default_config,
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Fetch the pool for `key`, creating one (and evicting the least
    /// recently used pool, if over `num_pools`) as needed.
    pub async fn get_or_create(&self, key: &PoolKey) -> Arc<PerOriginPool> {
        if let Some(existing) = self.pools.get(key) {
            let pool = existing.clone();
            drop(existing);
            self.touch(key);
            return pool;
        }

        let pool = Arc::new(PerOriginPool::new(key.clone(), self.default_config));
        self.pools.insert(key.clone(), pool.clone());
        self.touch(key);

        if let Some(evicted) = self.evict_if_over_capacity() {
            debug!(host = %evicted.key().host, "evicting least-recently-used connection pool");
            evicted.close().await;
        }

        pool
    }

    pub fn get(&self, key: &PoolKey) -> Option<Arc<PerOriginPool>> {
        let pool = self.pools.get(key).map(|e| e.clone());
        if pool.is_some() {
            self.touch(key);
        }
        pool
    }

    fn touch(&self, key: &PoolKey) {
        let mut order = self.order.lock();
        order.retain(|k| k != key);
        order.push_back(key.clone());
    }

    fn evict_if_over_capacity(&self) -> Option<Arc<PerOriginPool>> {
        if self.pools.len() <= self.num_pools {
            return None;
        }
        let lru_key = {
            let mut order = self.order.lock();
            order.pop_front()
        }?;
        self.pools.remove(&lru_key).map(|(_, pool)| pool)
    }

    /// Close every pool, e.g. on client shutdown.
    pub async fn close_all(&self) {
        let keys: Vec<PoolKey> = self.pools.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, pool)) = self.pools.remove(&key) {
                pool.close().await;
            }
        }
        self.order.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::key::VerifyMode;
    use crate::url::Scheme;

    fn key(host: &str) -> PoolKey {
        PoolKey::new(Scheme::Http, host, 80, None, VerifyMode::Verified)
    }

    #[tokio::test]
    async fn reuses_existing_pool_for_same_key() {
        let manager = PoolManager::new(10, ConnConfig::default());
        let a = manager.get_or_create(&key("a")).await;
        let b = manager.get_or_create(&key("a")).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn evicts_least_recently_used_pool_past_capacity() {
        let manager = PoolManager::new(2, ConnConfig::default());
        manager.get_or_create(&key("a")).await;
        manager.get_or_create(&key("b")).await;
        manager.get_or_create(&key("c")).await;

        assert_eq!(manager.pool_count(), 2);
        assert!(manager.get(&key("a")).is_none());
        assert!(manager.get(&key("b")).is_some());
        assert!(manager.get(&key("c")).is_some());
    }

    #[tokio::test]
    async fn touching_a_pool_protects_it_from_eviction() {
        let manager = PoolManager::new(2, ConnConfig::default());
        manager.get_or_create(&key("a")).await;
        manager.get_or_create(&key("b")).await;
        manager.get(&key("a")); // touch a, making b the LRU
        manager.get_or_create(&key("c")).await;

        assert!(manager.get(&key("a")).is_some());
        assert!(manager.get(&key("b")).is_none());
    }
}
