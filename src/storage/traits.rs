// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::listing::{Counter, ListingRecord, RatingRecord, RatingStats};
use crate::sanitize::SanitizedDocument;
use crate::search::{IndexSchema, SearchHits, SearchRequest};
use crate::value::Mapping;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation '{operation}' timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Primary (canonical) store for listings and their ratings.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ListingRecord>, StorageError>;

    /// Insert or replace a listing by id.
    async fn upsert(&self, record: &ListingRecord) -> Result<(), StorageError>;

    /// Every listing in the store.
    async fn all(&self) -> Result<Vec<ListingRecord>, StorageError>;

    /// Atomically add `by` to a counter and return the new value.
    /// Returns `None` when the listing does not exist.
    async fn increment_counter(
        &self,
        id: &str,
        counter: Counter,
        by: i64,
    ) -> Result<Option<i64>, StorageError>;

    /// Overwrite top-level attributes. Attributes not named in `fields`,
    /// counters included, are left as they are.
    /// Returns `false` when the listing does not exist.
    async fn set_fields(&self, id: &str, fields: &Mapping) -> Result<bool, StorageError>;

    async fn insert_rating(&self, rating: &RatingRecord) -> Result<(), StorageError>;

    /// Group all ratings of a listing: count and mean.
    /// Returns `None` when the listing has no ratings.
    async fn rating_stats(&self, listing_id: &str) -> Result<Option<RatingStats>, StorageError>;

    /// Newest listings by `createdAt`, descending.
    /// Default implementation sorts a full scan.
    async fn latest(&self, limit: usize) -> Result<Vec<ListingRecord>, StorageError> {
        let mut records = self.all().await?;
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }

    /// Distinct non-empty category names, sorted.
    /// Default implementation derives them from a full scan.
    async fn categories(&self) -> Result<Vec<String>, StorageError> {
        let mut categories: Vec<String> = self
            .all()
            .await?
            .iter()
            .filter_map(|r| r.category().map(str::to_string))
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

/// Outcome of an idempotent index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

/// Index statistics as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub document_count: u64,
    /// Engine still has pending indexing work
    pub is_indexing: bool,
}

/// External full-text search engine holding one collection per index name.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create the collection with the given schema. An existing collection
    /// is reported as [`IndexCreation::AlreadyExists`], never as an error.
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<IndexCreation, StorageError>;

    async fn delete_all(&self, index: &str) -> Result<(), StorageError>;

    /// Add or replace documents by id. Returns how many were submitted.
    async fn add_documents(
        &self,
        index: &str,
        documents: &[SanitizedDocument],
    ) -> Result<usize, StorageError>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits, StorageError>;

    async fn stats(&self, index: &str) -> Result<IndexStats, StorageError>;
}

/// Key/value cache with TTL-expiring writes.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError>;
}

/// Proof of holding a named lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Named mutual-exclusion lock with expiry.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Take the lock if free. `None` means someone else holds it.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, StorageError>;

    /// Release the lock, only if still held with `token`.
    async fn release(&self, name: &str, token: &LockToken) -> Result<(), StorageError>;
}
