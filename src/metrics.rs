// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation.
//!
//! Uses the `metrics` crate facade; the host process picks the exporter.
//!
//! # Naming
//! - `market_search_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: dependency call name (`store.get`, `index.search`, ...)
//! - `outcome`: hit, miss, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of a search cache lookup (hit, miss, error)
pub fn record_cache_lookup(outcome: &str) {
    counter!(
        "market_search_cache_lookups_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a search served from the engine
pub fn record_search_query(index: &str, results: usize) {
    counter!(
        "market_search_queries_total",
        "index" => index.to_string()
    )
    .increment(1);
    histogram!("market_search_query_results").record(results as f64);
}

/// Record a finished full sync
pub fn record_sync_run(index: &str, documents: u64, invalid: usize, duration: Duration) {
    counter!(
        "market_search_sync_runs_total",
        "index" => index.to_string()
    )
    .increment(1);
    gauge!(
        "market_search_indexed_documents",
        "index" => index.to_string()
    )
    .set(documents as f64);
    counter!(
        "market_search_invalid_documents_total",
        "index" => index.to_string()
    )
    .increment(invalid as u64);
    histogram!(
        "market_search_sync_seconds",
        "index" => index.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a sync attempt rejected because another run holds the lock
pub fn record_sync_contention(index: &str) {
    counter!(
        "market_search_sync_contention_total",
        "index" => index.to_string()
    )
    .increment(1);
}

/// Record a single-document upsert (incremental path)
pub fn record_incremental_upsert(index: &str) {
    counter!(
        "market_search_incremental_upserts_total",
        "index" => index.to_string()
    )
    .increment(1);
}

/// Record a rating submission
pub fn record_rating_submitted() {
    counter!("market_search_ratings_total").increment(1);
}

/// Record a failed dependency call
pub fn record_dependency_error(operation: &str) {
    counter!(
        "market_search_dependency_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a dependency call that hit its deadline
pub fn record_timeout(operation: &str) {
    counter!(
        "market_search_timeouts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "market_search_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// RAII timer that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
