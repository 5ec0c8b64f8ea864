// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Listing lifecycle outside of search: creation, detail fetch, latest,
//! categories and booking confirmation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::errors::{EngineError, Result, ValidationError};
use crate::listing::{Counter, ListingRecord, CREATED_AT};
use crate::ranking::PopularityUpdater;
use crate::resilience::timeout::with_timeout;
use crate::storage::RecordStore;
use crate::sync::IndexSynchronizer;
use crate::value::{Mapping, Value};

/// Attributes a new listing must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["title", "category", "price", "location", "sellerId"];

const SERVICE_ID: &str = "serviceId";
const ID_PREFIX: &str = "ss_";
const ID_LENGTH: usize = 10;

/// `ss_` followed by 10 random alphanumerics.
pub fn generate_listing_id() -> String {
    let random: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(ID_LENGTH)
        .collect();
    format!("{ID_PREFIX}{random}")
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Mapping(m)) => m.is_empty(),
        Some(_) => false,
    }
}

pub struct Catalog {
    store: Arc<dyn RecordStore>,
    synchronizer: Arc<IndexSynchronizer>,
    popularity: Arc<PopularityUpdater>,
    config: Arc<SearchConfig>,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn RecordStore>,
        synchronizer: Arc<IndexSynchronizer>,
        popularity: Arc<PopularityUpdater>,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            store,
            synchronizer,
            popularity,
            config,
        }
    }

    /// Validate, assign an id and creation time, store, then index.
    pub async fn create_listing(&self, mut attributes: Mapping) -> Result<ListingRecord> {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| is_blank(attributes.get(**field)))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing).into());
        }

        let id = generate_listing_id();
        attributes.insert(SERVICE_ID.to_string(), Value::String(id.clone()));
        attributes.insert(CREATED_AT.to_string(), Value::Date(Utc::now()));
        let record = ListingRecord::new(id, attributes);

        with_timeout("store.upsert", self.config.operation_timeout(), self.store.upsert(&record)).await?;
        info!(id = %record.id, "Listing created");

        // The next full sync repairs a failed upsert
        if let Err(e) = self.synchronizer.index_record(&record).await {
            warn!(id = %record.id, error = %e, "Listing stored but not indexed");
        }

        Ok(record)
    }

    /// Detail fetch. Counts as a view.
    pub async fn fetch_listing(&self, id: &str) -> Result<ListingRecord> {
        let update = self.popularity.recompute_popularity(id).await?;
        Ok(update.record)
    }

    /// Newest listings first.
    pub async fn latest_listings(&self) -> Result<Vec<ListingRecord>> {
        let limit = self.config.latest_limit;
        Ok(with_timeout("store.latest", self.config.operation_timeout(), self.store.latest(limit)).await?)
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        Ok(with_timeout("store.categories", self.config.operation_timeout(), self.store.categories()).await?)
    }

    /// Payment confirmed: count one booking. Returns the new booking count.
    pub async fn confirm_booking(&self, listing_id: &str) -> Result<i64> {
        let bookings = with_timeout(
            "store.increment",
            self.config.operation_timeout(),
            self.store.increment_counter(listing_id, Counter::ConfirmedBookings, 1),
        )
        .await?;

        match bookings {
            Some(count) => {
                info!(listing_id = %listing_id, count, "Booking confirmed");
                Ok(count)
            }
            None => {
                warn!(listing_id = %listing_id, "Booking confirmation for unknown listing");
                Err(EngineError::NotFound(listing_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::PopularityWeights;
    use crate::search::IndexSchema;
    use crate::storage::{InMemoryLock, InMemoryRecordStore, InMemorySearchEngine};
    use serde_json::json;

    fn catalog() -> (Catalog, Arc<InMemoryRecordStore>, Arc<InMemorySearchEngine>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let engine = Arc::new(InMemorySearchEngine::new());
        let config = Arc::new(SearchConfig {
            latest_limit: 2,
            ..SearchConfig::default()
        });
        let synchronizer = Arc::new(IndexSynchronizer::new(
            store.clone(),
            engine.clone(),
            Arc::new(InMemoryLock::new()),
            Arc::new(IndexSchema::listings("services")),
            config.clone(),
        ));
        let popularity = Arc::new(PopularityUpdater::new(
            store.clone(),
            synchronizer.clone(),
            PopularityWeights::default(),
            config.operation_timeout(),
        ));
        let catalog = Catalog::new(store.clone(), synchronizer, popularity, config);
        (catalog, store, engine)
    }

    fn attributes(json: serde_json::Value) -> Mapping {
        ListingRecord::from_json("", json).attributes
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_listing_id();
        assert!(id.starts_with("ss_"));
        assert_eq!(id.len(), 13);
        assert!(id[3..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_listing_id());
    }

    #[tokio::test]
    async fn test_create_listing_stores_and_indexes() {
        let (catalog, store, engine) = catalog();
        let record = catalog
            .create_listing(attributes(json!({
                "title": "Wedding photography",
                "category": "photography",
                "price": 250,
                "location": {"city": "Austin", "state": "TX"},
                "sellerId": "seller_1"
            })))
            .await
            .unwrap();

        assert_eq!(record.get("serviceId"), Some(&Value::String(record.id.clone())));
        assert!(record.created_at().is_some());
        assert!(store.get(&record.id).await.unwrap().is_some());
        assert!(engine.document("services", &record.id).is_some());
    }

    #[tokio::test]
    async fn test_create_listing_reports_every_missing_field() {
        let (catalog, store, _engine) = catalog();
        let err = catalog
            .create_listing(attributes(json!({"title": "x", "price": 10, "location": {}, "category": " "})))
            .await
            .unwrap_err();

        match err {
            EngineError::Validation(ValidationError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["category", "location", "sellerId"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_counts_views() {
        let (catalog, store, _engine) = catalog();
        store
            .upsert(&ListingRecord::from_json("ss_1", json!({"title": "x"})))
            .await
            .unwrap();

        catalog.fetch_listing("ss_1").await.unwrap();
        let record = catalog.fetch_listing("ss_1").await.unwrap();
        assert_eq!(record.counter(Counter::Views), 2);
        assert_eq!(record.number("popularityScore"), 1.0);

        assert!(matches!(
            catalog.fetch_listing("nope").await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_latest_and_categories() {
        let (catalog, store, _engine) = catalog();
        for (id, category, created) in [
            ("a", "music", "2025-01-01T00:00:00Z"),
            ("b", "art", "2025-02-01T00:00:00Z"),
            ("c", "music", "2025-03-01T00:00:00Z"),
        ] {
            store
                .upsert(&ListingRecord::from_json(id, json!({"category": category, "createdAt": created})))
                .await
                .unwrap();
        }

        let latest: Vec<_> = catalog.latest_listings().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(latest, vec!["c", "b"]);
        assert_eq!(catalog.categories().await.unwrap(), vec!["art", "music"]);
    }

    #[tokio::test]
    async fn test_confirm_booking() {
        let (catalog, store, _engine) = catalog();
        store
            .upsert(&ListingRecord::from_json("ss_1", json!({"title": "x"})))
            .await
            .unwrap();

        assert_eq!(catalog.confirm_booking("ss_1").await.unwrap(), 1);
        assert_eq!(catalog.confirm_booking("ss_1").await.unwrap(), 2);
        assert!(matches!(
            catalog.confirm_booking("nope").await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }
}
