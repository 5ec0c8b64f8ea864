// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{EngineError, Result, ValidationError};
use crate::listing::{Counter, ListingRecord, AVERAGE_RATING, POPULARITY_SCORE};
use crate::resilience::timeout::with_timeout;
use crate::storage::RecordStore;
use crate::sync::IndexSynchronizer;
use crate::value::{Mapping, Value};

/// Linear weights of the popularity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularityWeights {
    pub views: f64,
    pub confirmed_bookings: f64,
    pub rating: f64,
}

impl Default for PopularityWeights {
    fn default() -> Self {
        Self {
            views: 0.5,
            confirmed_bookings: 2.0,
            rating: 5.0,
        }
    }
}

impl PopularityWeights {
    /// `views*0.5 + confirmedBookings*2 + averageRating*5` with the defaults.
    #[must_use]
    pub fn score(&self, views: i64, confirmed_bookings: i64, rating: f64) -> f64 {
        views as f64 * self.views
            + confirmed_bookings as f64 * self.confirmed_bookings
            + rating * self.rating
    }
}

/// Result of one view: the new score and the listing as now stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularityUpdate {
    pub score: f64,
    pub record: ListingRecord,
}

pub struct PopularityUpdater {
    store: Arc<dyn RecordStore>,
    synchronizer: Arc<IndexSynchronizer>,
    weights: PopularityWeights,
    timeout: Duration,
}

impl PopularityUpdater {
    pub fn new(
        store: Arc<dyn RecordStore>,
        synchronizer: Arc<IndexSynchronizer>,
        weights: PopularityWeights,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            synchronizer,
            weights,
            timeout,
        }
    }

    /// Count one view, recompute the score, persist it and upsert the
    /// listing's index document.
    pub async fn recompute_popularity(&self, id: &str) -> Result<PopularityUpdate> {
        if id.trim().is_empty() {
            return Err(ValidationError::MissingFields(vec!["id".into()]).into());
        }

        // Atomic in the store: concurrent views are never lost
        with_timeout(
            "store.increment",
            self.timeout,
            self.store.increment_counter(id, Counter::Views, 1),
        )
        .await?
        .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let mut record = with_timeout("store.get", self.timeout, self.store.get(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        // Scored from the re-read record so the indexed document agrees with itself
        let views = record.counter(Counter::Views);
        let score = self.weights.score(
            views,
            record.counter(Counter::ConfirmedBookings),
            record.number(AVERAGE_RATING),
        );

        let mut fields = Mapping::new();
        fields.insert(POPULARITY_SCORE.to_string(), Value::Number(score));
        let updated = with_timeout("store.set_fields", self.timeout, self.store.set_fields(id, &fields)).await?;
        if !updated {
            return Err(EngineError::NotFound(id.to_string()));
        }
        record.set(POPULARITY_SCORE, score);

        self.synchronizer.index_record(&record).await?;
        debug!(id = %id, views, score, "Popularity recomputed");

        Ok(PopularityUpdate { score, record })
    }
}
