// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Cached, filtered, sorted text search over the listing index.
//!
//! # Architecture
//!
//! ```text
//! SearchParams ─► SearchQueryPlanner ─► SearchCache (cache-aside, TTL)
//!                        │
//!                        ▼
//!                 QueryBuilder (AST)
//!                        │
//!                        ├─→ FilterTranslator     → category = "x" AND price >= 0
//!                        └─→ RediSearchTranslator → @category:{x} @price:[0 +inf]
//! ```
//!
//! # Index Schema
//!
//! [`IndexSchema`] declares which attributes are searchable, filterable and
//! sortable. Engines create their collection from it on every sync; creating
//! an existing collection is a no-op.

mod filter_translator;
mod index_schema;
mod planner;
mod query_builder;
mod redis_translator;
mod search_cache;

pub use filter_translator::FilterTranslator;
pub use index_schema::{IndexSchema, SearchField, SearchFieldType};
pub use planner::{
    NormalizedParams, SearchHits, SearchParams, SearchQueryPlanner, SearchRequest,
    SearchResponse, SortClause, SortOrder, LOCATION_FILTER,
};
pub use query_builder::{FieldOperator, FieldQuery, Query, QueryBuilder, QueryNode, QueryValue};
pub use redis_translator::RediSearchTranslator;
pub use search_cache::{SearchCache, SearchCacheStats};
