// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search query planner.
//!
//! Cache-aside read path over the search index:
//!
//! ```text
//! SearchParams ─► normalize ─► cache key ─► hit? ──────────────► payload
//!                                  │ miss
//!                                  ▼
//!                          index empty? ──yes──► empty page (not cached)
//!                                  │ no
//!                                  ▼
//!                  filter AST + sort + offset ─► engine.search
//!                                  │
//!                                  ▼
//!                         SET key EX ttl ─► payload
//! ```
//!
//! Geo parameters (`lat`, `lng`, `radius`) are accepted and take part in the
//! cache key, but are not applied as an index filter.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::filter_translator::FilterTranslator;
use super::index_schema::IndexSchema;
use super::query_builder::{Query, QueryBuilder};
use super::search_cache::{SearchCache, SearchCacheStats};
use crate::config::SearchConfig;
use crate::errors::{Result, ValidationError};
use crate::listing::CREATED_AT;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::timeout::with_timeout;
use crate::storage::traits::SearchEngine;

/// Filterable attribute the `location` parameter matches against.
pub const LOCATION_FILTER: &str = "location.state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

/// Caller-facing search parameters. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    /// Matched against `location.state`
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// 1-based
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
}

/// Parameters with defaults applied; the cache key is computed from this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedParams {
    pub q: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_price: f64,
    pub max_price: Option<f64>,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub page: usize,
    pub limit: usize,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
}

impl NormalizedParams {
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub field: String,
    pub order: SortOrder,
}

impl fmt::Display for SortClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.order)
    }
}

/// One ranked text query against the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Free text, empty for "match everything"
    pub text: String,
    pub filter: Option<Query>,
    pub offset: usize,
    pub limit: usize,
    pub sort: Vec<SortClause>,
}

impl SearchRequest {
    /// The filter in `field = "v" AND field >= n` form.
    pub fn filter_expression(&self) -> Option<String> {
        self.filter.as_ref().map(FilterTranslator::translate)
    }

    /// Sort clauses as `field:direction`.
    pub fn sort_expressions(&self) -> Vec<String> {
        self.sort.iter().map(ToString::to_string).collect()
    }
}

/// Engine answer: one page of hits plus the engine's total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub hits: Vec<JsonValue>,
    pub total: u64,
}

/// Payload returned to callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub results: Vec<JsonValue>,
}

impl SearchResponse {
    pub fn empty(page: usize, limit: usize) -> Self {
        Self {
            total: 0,
            page,
            limit,
            results: Vec::new(),
        }
    }
}

pub struct SearchQueryPlanner {
    engine: Arc<dyn SearchEngine>,
    cache: SearchCache,
    schema: Arc<IndexSchema>,
    config: Arc<SearchConfig>,
}

impl SearchQueryPlanner {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        cache: SearchCache,
        schema: Arc<IndexSchema>,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            engine,
            cache,
            schema,
            config,
        }
    }

    /// Run a cached search.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        let _timer = LatencyTimer::new("search");
        let normalized = self.normalize(params)?;
        let key = self.cache.key_for(&normalized);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let index = self.schema.name.as_str();
        let timeout = self.config.operation_timeout();

        let stats = with_timeout("index.stats", timeout, self.engine.stats(index)).await?;
        if stats.document_count == 0 {
            debug!(index = %index, "Index is empty, returning empty page");
            return Ok(SearchResponse::empty(normalized.page, normalized.limit));
        }

        if normalized.radius.is_some() {
            debug!(index = %index, "Geo radius accepted but not applied as a filter");
        }

        let request = self.plan(&normalized);
        let hits = with_timeout("index.search", timeout, self.engine.search(index, &request)).await?;
        metrics::record_search_query(index, hits.hits.len());

        info!(
            index = %index,
            q = %normalized.q,
            filter = ?request.filter_expression(),
            total = hits.total,
            returned = hits.hits.len(),
            "Search served from index"
        );

        let response = SearchResponse {
            total: hits.total,
            page: normalized.page,
            limit: normalized.limit,
            results: hits.hits,
        };
        self.cache.put(&key, &response).await;
        Ok(response)
    }

    /// Apply defaults and reject malformed parameters.
    pub fn normalize(&self, params: &SearchParams) -> Result<NormalizedParams> {
        let min_price = finite("minPrice", params.min_price)?.unwrap_or(0.0);
        let max_price = finite("maxPrice", params.max_price)?;
        if let Some(max) = max_price {
            if max < min_price {
                return Err(ValidationError::invalid("maxPrice", "must not be below minPrice").into());
            }
        }

        let sort_by = trimmed(params.sort_by.as_deref()).unwrap_or_else(|| CREATED_AT.to_string());
        if !self.schema.is_sortable(&sort_by) {
            return Err(ValidationError::invalid(
                "sortBy",
                format!("'{}' is not sortable", sort_by),
            )
            .into());
        }

        let max_limit = self.config.max_page_limit.max(1);
        let limit = params
            .limit
            .unwrap_or(self.config.default_page_limit)
            .clamp(1, max_limit);

        Ok(NormalizedParams {
            q: trimmed(params.q.as_deref()).unwrap_or_default(),
            category: trimmed(params.category.as_deref()),
            location: trimmed(params.location.as_deref()),
            min_price,
            max_price,
            sort_by,
            sort_order: params.sort_order.unwrap_or_default(),
            page: params.page.unwrap_or(1).max(1),
            limit,
            lat: finite("lat", params.lat)?,
            lng: finite("lng", params.lng)?,
            radius: finite("radius", params.radius)?,
        })
    }

    /// Translate normalized parameters into an index request.
    pub fn plan(&self, params: &NormalizedParams) -> SearchRequest {
        let filter = QueryBuilder::new()
            .field_eq_opt("category", params.category.as_deref())
            .field_eq_opt(LOCATION_FILTER, params.location.as_deref())
            .numeric_range("price", Some(params.min_price), params.max_price)
            .build_and();

        SearchRequest {
            text: params.q.clone(),
            filter,
            offset: params.offset(),
            limit: params.limit,
            sort: vec![SortClause {
                field: params.sort_by.clone(),
                order: params.sort_order,
            }],
        }
    }

    pub fn cache_stats(&self) -> SearchCacheStats {
        self.cache.stats()
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn finite(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() => Err(ValidationError::invalid(field, "must be a finite number").into()),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::sanitize::DocumentSanitizer;
    use crate::storage::memory::InMemoryCache;
    use crate::storage::memory_index::InMemorySearchEngine;
    use crate::ListingRecord;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        planner: SearchQueryPlanner,
        engine: Arc<InMemorySearchEngine>,
    }

    async fn fixture(listings: Vec<serde_json::Value>) -> Fixture {
        let config = Arc::new(SearchConfig::default());
        let schema = Arc::new(IndexSchema::listings(&config.index_name));
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.ensure_index(&schema).await.unwrap();

        let sanitizer = DocumentSanitizer::default();
        let documents: Vec<_> = listings
            .into_iter()
            .enumerate()
            .map(|(i, attrs)| sanitizer.sanitize_record(&ListingRecord::from_json(format!("ss_{i}"), attrs)))
            .collect();
        if !documents.is_empty() {
            engine.add_documents(&schema.name, &documents).await.unwrap();
        }

        let cache = SearchCache::new(
            Arc::new(InMemoryCache::new()),
            "search:",
            config.cache_ttl(),
            Duration::from_secs(1),
        );
        let planner = SearchQueryPlanner::new(engine.clone(), cache, schema, config);
        Fixture { planner, engine }
    }

    fn catalog() -> Vec<serde_json::Value> {
        vec![
            json!({"title": "Wedding photography", "category": "photography", "price": 300,
                   "location": {"state": "CA"}, "createdAt": "2025-01-01T00:00:00.000Z"}),
            json!({"title": "Product photography", "category": "photography", "price": 80,
                   "location": {"state": "NY"}, "createdAt": "2025-02-01T00:00:00.000Z"}),
            json!({"title": "Jazz band", "category": "music", "price": 450,
                   "location": {"state": "CA"}, "createdAt": "2025-03-01T00:00:00.000Z"}),
        ]
    }

    #[tokio::test]
    async fn test_filter_expression_from_params() {
        let f = fixture(vec![]).await;
        let params = SearchParams {
            category: Some("photography".into()),
            min_price: Some(100.0),
            max_price: Some(500.0),
            ..Default::default()
        };
        let request = f.planner.plan(&f.planner.normalize(&params).unwrap());

        assert_eq!(
            request.filter_expression().as_deref(),
            Some(r#"category = "photography" AND price >= 100 AND price <= 500"#)
        );
        assert_eq!(request.sort_expressions(), vec!["createdAt:desc".to_string()]);
    }

    #[tokio::test]
    async fn test_defaults() {
        let f = fixture(vec![]).await;
        let normalized = f.planner.normalize(&SearchParams::default()).unwrap();

        assert_eq!(normalized.page, 1);
        assert_eq!(normalized.limit, 10);
        assert_eq!(normalized.min_price, 0.0);
        assert_eq!(normalized.max_price, None);
        assert_eq!(normalized.sort_by, "createdAt");
        assert_eq!(normalized.sort_order, SortOrder::Desc);

        let request = f.planner.plan(&normalized);
        assert_eq!(request.filter_expression().as_deref(), Some("price >= 0"));
        assert_eq!(request.offset, 0);
    }

    #[tokio::test]
    async fn test_offset_and_limit_clamp() {
        let f = fixture(vec![]).await;
        let params = SearchParams {
            page: Some(3),
            limit: Some(5),
            ..Default::default()
        };
        assert_eq!(f.planner.normalize(&params).unwrap().offset(), 10);

        let params = SearchParams {
            page: Some(0),
            limit: Some(10_000),
            ..Default::default()
        };
        let normalized = f.planner.normalize(&params).unwrap();
        assert_eq!(normalized.page, 1);
        assert_eq!(normalized.limit, 100);
    }

    #[tokio::test]
    async fn test_rejects_bad_params() {
        let f = fixture(vec![]).await;

        let unsortable = SearchParams {
            sort_by: Some("title".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.planner.normalize(&unsortable),
            Err(EngineError::Validation(_))
        ));

        let inverted = SearchParams {
            min_price: Some(50.0),
            max_price: Some(10.0),
            ..Default::default()
        };
        assert!(matches!(f.planner.normalize(&inverted), Err(EngineError::Validation(_))));

        let nan = SearchParams {
            min_price: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(f.planner.normalize(&nan), Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cache_key_ignores_parameter_order() {
        let f = fixture(vec![]).await;
        let a: SearchParams =
            serde_json::from_str(r#"{"category": "music", "minPrice": 10, "page": 1}"#).unwrap();
        let b: SearchParams =
            serde_json::from_str(r#"{"page": 1, "minPrice": 10, "category": "music"}"#).unwrap();
        // Explicit defaults normalize to the same key as omitted ones
        let c: SearchParams = serde_json::from_str(
            r#"{"category": " music ", "minPrice": 10, "sortBy": "createdAt", "sortOrder": "desc"}"#,
        )
        .unwrap();

        let key = |p: &SearchParams| f.planner.cache.key_for(&f.planner.normalize(p).unwrap());
        assert_eq!(key(&a), key(&b));
        assert_eq!(key(&a), key(&c));
    }

    #[tokio::test]
    async fn test_second_identical_search_served_from_cache() {
        let f = fixture(catalog()).await;
        let params = SearchParams {
            category: Some("photography".into()),
            ..Default::default()
        };

        let first = f.planner.search(&params).await.unwrap();
        let second = f.planner.search(&params).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.total, 2);
        assert_eq!(f.engine.search_count(), 1);
        assert_eq!(f.planner.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_results_sorted_and_filtered() {
        let f = fixture(catalog()).await;
        let params = SearchParams {
            location: Some("CA".into()),
            sort_by: Some("price".into()),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        };

        let response = f.planner.search(&params).await.unwrap();
        let titles: Vec<_> = response.results.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec![json!("Wedding photography"), json!("Jazz band")]);
    }

    #[tokio::test]
    async fn test_empty_index_short_circuits() {
        let f = fixture(vec![]).await;
        let params = SearchParams {
            page: Some(2),
            ..Default::default()
        };

        let response = f.planner.search(&params).await.unwrap();
        assert_eq!(response, SearchResponse::empty(2, 10));
        assert_eq!(f.engine.search_count(), 0);

        // Empty pages are not cached
        f.planner.search(&params).await.unwrap();
        assert_eq!(f.planner.cache_stats().hits, 0);
    }

    #[tokio::test]
    async fn test_geo_params_accepted_not_applied() {
        let f = fixture(catalog()).await;
        let params = SearchParams {
            lat: Some(34.0),
            lng: Some(-118.2),
            radius: Some(1.0),
            ..Default::default()
        };

        let response = f.planner.search(&params).await.unwrap();
        assert_eq!(response.total, 3);
    }
}
