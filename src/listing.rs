// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Canonical listing records.
//!
//! A [`ListingRecord`] is the source-of-truth entity owned by the primary
//! store: a caller-assigned string id plus a free-form attribute mapping.
//! The search pipeline only ever reads these; sanitized documents are
//! derived from them on every pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{Mapping, Value};

/// Attribute holding the view counter.
pub const VIEWS: &str = "views";
/// Attribute holding the number of confirmed bookings.
pub const CONFIRMED_BOOKINGS: &str = "confirmedBookings";
/// Attribute holding the last computed popularity score.
pub const POPULARITY_SCORE: &str = "popularityScore";
/// Attribute holding the rounded mean rating.
pub const AVERAGE_RATING: &str = "averageRating";
/// Attribute holding the number of ratings.
pub const REVIEW_COUNT: &str = "reviewCount";
/// Creation timestamp attribute.
pub const CREATED_AT: &str = "createdAt";
/// Category attribute.
pub const CATEGORY: &str = "category";

/// Monotonic counters the store can increment atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Views,
    ConfirmedBookings,
}

impl Counter {
    /// Attribute name the counter is exposed under.
    #[must_use]
    pub fn attribute(self) -> &'static str {
        match self {
            Counter::Views => VIEWS,
            Counter::ConfirmedBookings => CONFIRMED_BOOKINGS,
        }
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.attribute())
    }
}

/// A listing as stored in the primary store.
///
/// # Example
///
/// ```
/// use market_search::ListingRecord;
/// use serde_json::json;
///
/// let record = ListingRecord::from_json("ss_abc", json!({"title": "Portraits", "views": 3}));
/// assert_eq!(record.id, "ss_abc");
/// assert_eq!(record.number("views"), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    /// Caller-assigned identity (the listing's `serviceId`)
    pub id: String,
    /// Free-form nested attributes
    pub attributes: Mapping,
}

impl ListingRecord {
    pub fn new(id: impl Into<String>, attributes: Mapping) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Build a record from (extended) JSON attributes. Non-object JSON
    /// yields a record with no attributes.
    pub fn from_json(id: impl Into<String>, attributes: serde_json::Value) -> Self {
        let attributes = match Value::from_json(&attributes) {
            Value::Mapping(m) => m,
            _ => Mapping::new(),
        };
        Self::new(id, attributes)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Numeric attribute, treating absent or non-numeric values as zero.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        match self.attributes.get(key) {
            Some(Value::Number(n)) if n.is_finite() => *n,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Current value of an atomic counter.
    #[must_use]
    pub fn counter(&self, counter: Counter) -> i64 {
        self.number(counter.attribute()) as i64
    }

    /// Category name, when set to a non-empty string.
    pub fn category(&self) -> Option<&str> {
        self.attributes
            .get(CATEGORY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Creation time, accepting either a date value or an RFC 3339 string.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.attributes.get(CREATED_AT)? {
            Value::Date(d) => Some(*d),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// One rating submitted for a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub listing_id: String,
    pub rater_id: String,
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of grouping all ratings of one listing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub count: u64,
    pub mean: f64,
}
