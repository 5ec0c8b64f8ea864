// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Response Cache
//!
//! Cache-aside layer over a [`ResponseCache`] with fixed-TTL entries.
//!
//! # Why This Works
//!
//! - Key = SHA-256 of the normalized parameter set (struct field order is
//!   fixed, so caller-side parameter order never changes the key)
//! - Entries are written once and expire; nothing is ever edited in place
//! - A hit may be up to one TTL stale, which is the accepted bound
//! - Cache failures degrade to a miss, never to an error
//!
//! # Flow
//!
//! ```text
//! search(params)
//!       │
//!       ▼
//! ┌─────────────────────────────┐
//! │  key = sha256(normalized)   │
//! │  GET key                    │
//! └─────────────────────────────┘
//!       │
//!       ├─→ Hit → return stored payload verbatim
//!       │
//!       └─→ Miss / error → query index, SET key EX ttl
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::planner::SearchResponse;
use crate::metrics;
use crate::resilience::timeout::with_timeout;
use crate::storage::traits::ResponseCache;

/// Search response cache
pub struct SearchCache {
    store: Arc<dyn ResponseCache>,
    key_prefix: String,
    ttl: Duration,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct SearchCacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses (including degraded lookups)
    pub misses: u64,
    /// Number of failed cache reads or writes
    pub errors: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

impl SearchCache {
    pub fn new(
        store: Arc<dyn ResponseCache>,
        key_prefix: impl Into<String>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
            timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic key for a parameter set.
    pub fn key_for<P: Serialize>(&self, params: &P) -> String {
        // Serializing plain structs of strings/numbers/options cannot fail
        let bytes = serde_json::to_vec(params).unwrap_or_default();
        format!("{}{}", self.key_prefix, hex::encode(Sha256::digest(&bytes)))
    }

    /// Stored response for `key`. Errors and undecodable payloads count as misses.
    pub async fn get(&self, key: &str) -> Option<SearchResponse> {
        let lookup = with_timeout("cache.get", self.timeout, self.store.get(key)).await;

        match lookup {
            Ok(Some(payload)) => match serde_json::from_str::<SearchResponse>(&payload) {
                Ok(response) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_lookup("hit");
                    debug!(key = %key, "Search cache hit");
                    Some(response)
                }
                Err(e) => {
                    self.record_error();
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("miss");
                None
            }
            Err(e) => {
                self.record_error();
                warn!(key = %key, error = %e, "Search cache unavailable, treating as miss");
                None
            }
        }
    }

    /// Write a response with the fixed TTL. Failures are logged and swallowed.
    pub async fn put(&self, key: &str, response: &SearchResponse) {
        let payload = match serde_json::to_string(response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Search response not serializable, skipping cache");
                return;
            }
        };

        let write = with_timeout(
            "cache.set",
            self.timeout,
            self.store.set_ex(key, &payload, self.ttl),
        )
        .await;

        if let Err(e) = write {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Failed to write search cache entry");
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> SearchCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        SearchCacheStats {
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn record_error(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryCache;
    use crate::storage::traits::StorageError;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenCache;

    #[async_trait]
    impl ResponseCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Connection("refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StorageError> {
            Err(StorageError::Connection("refused".into()))
        }
    }

    #[derive(Serialize)]
    struct Params {
        q: &'static str,
        page: usize,
    }

    fn cache(store: Arc<dyn ResponseCache>) -> SearchCache {
        SearchCache::new(store, "search:", Duration::from_secs(300), Duration::from_secs(1))
    }

    fn response() -> SearchResponse {
        SearchResponse {
            total: 1,
            page: 1,
            limit: 10,
            results: vec![json!({"id": "ss_1", "title": "Portraits"})],
        }
    }

    #[test]
    fn test_key_is_deterministic_and_prefixed() {
        let cache = cache(Arc::new(InMemoryCache::new()));
        let a = cache.key_for(&Params { q: "dj", page: 1 });
        let b = cache.key_for(&Params { q: "dj", page: 1 });
        let c = cache.key_for(&Params { q: "dj", page: 2 });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("search:"));
        assert_eq!(a.len(), "search:".len() + 64);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = cache(Arc::new(InMemoryCache::new()));
        let key = cache.key_for(&Params { q: "dj", page: 1 });

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &response()).await;
        assert_eq!(cache.get(&key).await, Some(response()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_miss() {
        let cache = cache(Arc::new(BrokenCache));
        let key = cache.key_for(&Params { q: "dj", page: 1 });

        cache.put(&key, &response()).await;
        assert!(cache.get(&key).await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(InMemoryCache::new());
        store.set_ex("search:bad", "{not json", Duration::from_secs(60)).await.unwrap();

        let cache = cache(store);
        assert!(cache.get("search:bad").await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }
}
