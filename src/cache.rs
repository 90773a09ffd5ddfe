//! # Caching Layer - bounded in-memory cache with explicit invalidation
//!
//! Catalog data is near-static, so entries never expire on their own. Callers
//! drop them through [`CacheManager::invalidate`], [`CacheManager::invalidate_prefix`]
//! or [`CacheManager::clear`] when the underlying tables change.

use crate::error::{Result, StorefrontError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Namespaces of cache keys
pub const CATALOG_NAMESPACE: &str = "catalog:";
pub const SUMMARY_NAMESPACE: &str = "summary:";

/// Unique cache key, built from the exact argument tuple of the cached call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn categories() -> Self {
        Self(format!("{CATALOG_NAMESPACE}categories"))
    }

    pub fn genders() -> Self {
        Self(format!("{CATALOG_NAMESPACE}genders"))
    }

    pub fn products(category: &str, limit: u32) -> Self {
        Self(format!("{CATALOG_NAMESPACE}products:{limit}:{category}"))
    }

    pub fn product(product_id: &str) -> Self {
        Self(format!("{CATALOG_NAMESPACE}product:{product_id}"))
    }

    pub fn summary(review_text: &str) -> Self {
        Self(format!("{SUMMARY_NAMESPACE}{review_text}"))
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// L1 in-memory cache
pub struct L1Cache {
    entries: RwLock<HashMap<CacheKey, Vec<u8>>>,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl L1Cache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().await;
        let mut stats = self.stats.write().await;
        stats.total_requests += 1;
        if let Some(data) = entries.get(key) {
            if let Ok(value) = bincode::deserialize(data) {
                stats.hits += 1;
                return Some(value);
            }
        }
        stats.misses += 1;
        None
    }

    pub async fn put<T: Serialize>(&self, key: CacheKey, value: &T) -> Result<()> {
        let data = bincode::serialize(value)
            .map_err(|e| StorefrontError::Serialization(e.to_string()))?;

        let mut entries = self.entries.write().await;

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            self.stats.write().await.evictions += 1;
            if let Some(first) = entries.keys().next().cloned() {
                entries.remove(&first);
            }
        }

        entries.insert(key, data);
        Ok(())
    }

    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.stats.write().await.invalidations += 1;
        }
        removed
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.has_prefix(prefix));
        let removed = before - entries.len();
        self.stats.write().await.invalidations += removed as u64;
        removed
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        self.stats.write().await.invalidations += removed as u64;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

/// Main cache manager
pub struct CacheManager {
    l1: L1Cache,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("max_entries", &self.l1.config.max_entries)
            .finish()
    }
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            l1: L1Cache::new(config),
        }
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Option<T> {
        self.l1.get(key).await
    }

    pub async fn put<T: Serialize>(&self, key: CacheKey, value: &T) -> Result<()> {
        self.l1.put(key, value).await
    }

    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.l1.invalidate(key).await
    }

    /// Drop every entry whose key starts with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.l1.invalidate_prefix(prefix).await
    }

    pub async fn len(&self) -> usize {
        self.l1.len().await
    }

    pub async fn stats(&self) -> CacheStats {
        self.l1.stats().await
    }

    pub async fn clear(&self) {
        self.l1.clear().await
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, count: usize) -> Self {
        self.config.max_entries = count.max(1);
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
