// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Derived listing aggregates.
//!
//! - [`PopularityUpdater`]: view counter + weighted popularity score, pushed
//!   to the index as a single-document upsert
//! - [`ReviewAggregator`]: rating insert + full regrouping of the mean and count

mod popularity;
mod reviews;

pub use popularity::{PopularityUpdate, PopularityUpdater, PopularityWeights};
pub use reviews::{RatingSubmission, RatingSummary, ReviewAggregator};
