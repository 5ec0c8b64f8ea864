// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backends.
//!
//! Used when no SQL / Redis URL is configured and as test doubles. Every
//! mutation of a single listing happens under its DashMap shard lock, so
//! counter increments are atomic without a separate read and write.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::traits::{LockToken, RecordStore, ResponseCache, StorageError, SyncLock};
use crate::listing::{Counter, ListingRecord, RatingRecord, RatingStats};
use crate::value::{Mapping, Value};

#[derive(Default)]
pub struct InMemoryRecordStore {
    listings: DashMap<String, ListingRecord>,
    ratings: DashMap<String, Vec<RatingRecord>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current listing count
    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Number of ratings stored for a listing
    #[must_use]
    pub fn rating_count(&self, listing_id: &str) -> usize {
        self.ratings.get(listing_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<ListingRecord>, StorageError> {
        Ok(self.listings.get(id).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &ListingRecord) -> Result<(), StorageError> {
        self.listings.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ListingRecord>, StorageError> {
        let mut records: Vec<ListingRecord> =
            self.listings.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn increment_counter(
        &self,
        id: &str,
        counter: Counter,
        by: i64,
    ) -> Result<Option<i64>, StorageError> {
        let Some(mut record) = self.listings.get_mut(id) else {
            return Ok(None);
        };
        let next = record.counter(counter) + by;
        record.set(counter.attribute(), Value::from(next));
        Ok(Some(next))
    }

    async fn set_fields(&self, id: &str, fields: &Mapping) -> Result<bool, StorageError> {
        let Some(mut record) = self.listings.get_mut(id) else {
            return Ok(false);
        };
        for (key, value) in fields {
            record.set(key.clone(), value.clone());
        }
        Ok(true)
    }

    async fn insert_rating(&self, rating: &RatingRecord) -> Result<(), StorageError> {
        self.ratings
            .entry(rating.listing_id.clone())
            .or_default()
            .push(rating.clone());
        Ok(())
    }

    async fn rating_stats(&self, listing_id: &str) -> Result<Option<RatingStats>, StorageError> {
        let Some(ratings) = self.ratings.get(listing_id) else {
            return Ok(None);
        };
        if ratings.is_empty() {
            return Ok(None);
        }
        let sum: f64 = ratings.iter().map(|r| r.rating).sum();
        let count = ratings.len() as u64;
        Ok(Some(RatingStats {
            count,
            mean: sum / count as f64,
        }))
    }
}

/// TTL cache. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Process-local named locks with expiry.
#[derive(Default)]
pub struct InMemoryLock {
    held: DashMap<String, (LockToken, Instant)>,
}

impl InMemoryLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncLock for InMemoryLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, StorageError> {
        let now = Instant::now();
        let token = LockToken::generate();

        match self.held.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().1 > now {
                    return Ok(None);
                }
                // Previous holder's lease ran out
                entry.insert((token.clone(), now + ttl));
            }
            Entry::Vacant(entry) => {
                entry.insert((token.clone(), now + ttl));
            }
        }
        Ok(Some(token))
    }

    async fn release(&self, name: &str, token: &LockToken) -> Result<(), StorageError> {
        self.held.remove_if(name, |_, (held, _)| held == token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn listing(id: &str) -> ListingRecord {
        ListingRecord::from_json(id, json!({"title": "Portraits", "category": "photography"}))
    }

    fn rating(listing_id: &str, value: f64) -> RatingRecord {
        RatingRecord {
            listing_id: listing_id.into(),
            rater_id: "u1".into(),
            rating: value,
            comment: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = InMemoryRecordStore::new();
        assert!(store.is_empty());

        store.upsert(&listing("ss_1")).await.unwrap();
        let fetched = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(fetched.category(), Some("photography"));
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_counter() {
        let store = InMemoryRecordStore::new();
        store.upsert(&listing("ss_1")).await.unwrap();

        assert_eq!(store.increment_counter("ss_1", Counter::Views, 1).await.unwrap(), Some(1));
        assert_eq!(store.increment_counter("ss_1", Counter::Views, 2).await.unwrap(), Some(3));
        assert_eq!(store.increment_counter("nope", Counter::Views, 1).await.unwrap(), None);

        let record = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(record.counter(Counter::Views), 3);
    }

    #[tokio::test]
    async fn test_concurrent_increments_not_lost() {
        let store = std::sync::Arc::new(InMemoryRecordStore::new());
        store.upsert(&listing("ss_1")).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.increment_counter("ss_1", Counter::Views, 1).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let record = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(record.counter(Counter::Views), 50);
    }

    #[tokio::test]
    async fn test_set_fields() {
        let store = InMemoryRecordStore::new();
        store.upsert(&listing("ss_1")).await.unwrap();

        let mut fields = Mapping::new();
        fields.insert("averageRating".into(), Value::Number(4.5));
        assert!(store.set_fields("ss_1", &fields).await.unwrap());
        assert!(!store.set_fields("nope", &fields).await.unwrap());

        let record = store.get("ss_1").await.unwrap().unwrap();
        assert_eq!(record.number("averageRating"), 4.5);
        assert_eq!(record.category(), Some("photography"));
    }

    #[tokio::test]
    async fn test_rating_stats() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.rating_stats("ss_1").await.unwrap(), None);

        store.insert_rating(&rating("ss_1", 4.0)).await.unwrap();
        store.insert_rating(&rating("ss_1", 5.0)).await.unwrap();
        store.insert_rating(&rating("ss_2", 1.0)).await.unwrap();

        let stats = store.rating_stats("ss_1").await.unwrap().unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 4.5).abs() < f64::EPSILON);
        assert_eq!(store.rating_count("ss_2"), 1);
    }

    #[tokio::test]
    async fn test_latest_and_categories_defaults() {
        let store = InMemoryRecordStore::new();
        store
            .upsert(&ListingRecord::from_json("a", json!({"category": "music", "createdAt": "2025-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .upsert(&ListingRecord::from_json("b", json!({"category": "art", "createdAt": "2025-03-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .upsert(&ListingRecord::from_json("c", json!({"category": "music"})))
            .await
            .unwrap();

        let latest: Vec<_> = store.latest(2).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(latest, vec!["b", "a"]);
        assert_eq!(store.categories().await.unwrap(), vec!["art", "music"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", Duration::from_secs(300)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_single_holder_and_expiry() {
        let lock = InMemoryLock::new();
        let ttl = Duration::from_secs(60);

        let token = lock.try_acquire("sync:services", ttl).await.unwrap().unwrap();
        assert!(lock.try_acquire("sync:services", ttl).await.unwrap().is_none());
        // Different name is independent
        assert!(lock.try_acquire("sync:other", ttl).await.unwrap().is_some());

        // Releasing with a foreign token is a no-op
        lock.release("sync:services", &LockToken("foreign".into())).await.unwrap();
        assert!(lock.try_acquire("sync:services", ttl).await.unwrap().is_none());

        lock.release("sync:services", &token).await.unwrap();
        let second = lock.try_acquire("sync:services", ttl).await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let third = lock.try_acquire("sync:services", ttl).await.unwrap();
        assert!(third.is_some());
        assert_ne!(third, Some(second));
    }
}
