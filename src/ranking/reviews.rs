// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::errors::{EngineError, Result, ValidationError};
use crate::listing::{RatingRecord, AVERAGE_RATING, REVIEW_COUNT};
use crate::metrics;
use crate::resilience::timeout::with_timeout;
use crate::storage::{RecordStore, StorageError};
use crate::value::{Mapping, Value};

/// A rating as submitted by a caller. `rating` must be a JSON number.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingSubmission {
    pub listing_id: String,
    pub rater_id: String,
    pub rating: JsonValue,
    pub comment: Option<String>,
}

impl RatingSubmission {
    pub fn new(
        listing_id: impl Into<String>,
        rater_id: impl Into<String>,
        rating: f64,
        comment: Option<String>,
    ) -> Self {
        Self {
            listing_id: listing_id.into(),
            rater_id: rater_id.into(),
            rating: serde_json::Number::from_f64(rating)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            comment,
        }
    }

    fn validated_rating(&self) -> std::result::Result<f64, ValidationError> {
        let mut missing = Vec::new();
        if self.listing_id.trim().is_empty() {
            missing.push("listingId".to_string());
        }
        if self.rater_id.trim().is_empty() {
            missing.push("raterId".to_string());
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        match &self.rating {
            JsonValue::Number(n) => n
                .as_f64()
                .filter(|r| r.is_finite())
                .ok_or_else(|| ValidationError::invalid("rating", "not a finite number")),
            JsonValue::Null => Err(ValidationError::MissingFields(vec!["rating".into()])),
            _ => Err(ValidationError::invalid("rating", "must be a number")),
        }
    }
}

/// Aggregate written back to the listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    /// Mean rounded to one decimal
    pub average_rating: f64,
    pub count: u64,
}

pub struct ReviewAggregator {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl ReviewAggregator {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Store the rating, then regroup every rating of the listing.
    pub async fn submit_rating(&self, submission: &RatingSubmission) -> Result<RatingSummary> {
        let rating = submission.validated_rating()?;
        let listing_id = submission.listing_id.trim();

        let exists = with_timeout("store.get", self.timeout, self.store.get(listing_id)).await?;
        if exists.is_none() {
            return Err(EngineError::NotFound(listing_id.to_string()));
        }

        let record = RatingRecord {
            listing_id: listing_id.to_string(),
            rater_id: submission.rater_id.trim().to_string(),
            rating,
            comment: submission.comment.clone(),
            created_at: Utc::now(),
        };
        with_timeout("store.insert_rating", self.timeout, self.store.insert_rating(&record)).await?;

        let stats = with_timeout("store.rating_stats", self.timeout, self.store.rating_stats(listing_id))
            .await?
            .ok_or_else(|| {
                StorageError::Backend(format!("rating aggregation for '{}' returned no rows", listing_id))
            })?;

        let summary = RatingSummary {
            average_rating: round_one_decimal(stats.mean),
            count: stats.count,
        };

        let mut fields = Mapping::new();
        fields.insert(AVERAGE_RATING.to_string(), Value::Number(summary.average_rating));
        fields.insert(REVIEW_COUNT.to_string(), Value::from(summary.count as i64));
        with_timeout("store.set_fields", self.timeout, self.store.set_fields(listing_id, &fields)).await?;

        metrics::record_rating_submitted();
        info!(
            listing_id = %listing_id,
            average_rating = summary.average_rating,
            count = summary.count,
            "Rating recorded"
        );
        Ok(summary)
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
