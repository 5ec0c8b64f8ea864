// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Market Search
//!
//! Keeps a listings search index consistent with its primary store and
//! serves cached, structured search over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Primary store (SQL / memory)               │
//! │  • Canonical listings + ratings                            │
//! │  • Atomic counters (views, confirmed bookings)             │
//! └─────────────────────────────────────────────────────────────┘
//!          │ all()                              ▲ increment / set_fields
//!          ▼                                    │
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  DocumentSanitizer       │      │  PopularityUpdater       │
//! │  • listing projection    │      │  ReviewAggregator        │
//! │  • depth-bounded flatten │      └──────────────────────────┘
//! │  DocumentValidator       │                  │ single-document upsert
//! └──────────────────────────┘                  │
//!          │ IndexSynchronizer (locked, replace-all)
//!          ▼                                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Search index (RediSearch / memory)            │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲
//!          │ SearchQueryPlanner ─► SearchCache (cache-aside, 5 min TTL)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use market_search::{Marketplace, SearchConfig};
//! use market_search::search::SearchParams;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), market_search::EngineError> {
//!     let config = SearchConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         sql_url: Some("sqlite://market.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!
//!     let market = Marketplace::connect(config).await?;
//!     let report = market.sync().await?;
//!     println!("indexed {} listings", report.documents_indexed);
//!
//!     let page = market
//!         .search(&SearchParams {
//!             q: Some("wedding".into()),
//!             category: Some("photography".into()),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{} matches", page.total);
//!
//!     market.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`Marketplace`] facade and its lifecycle
//! - [`sanitize`]: record → index document normalization and validation
//! - [`sync`]: full resync and incremental upsert
//! - [`search`]: query AST, translators, index schema, cache, planner
//! - [`ranking`]: popularity score and rating aggregation
//! - [`catalog`]: listing creation, detail fetch, latest, categories, bookings
//! - [`storage`]: store, index, cache and lock backends
//! - [`resilience`]: startup retry and per-call timeouts

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod listing;
pub mod metrics;
pub mod ranking;
pub mod resilience;
pub mod sanitize;
pub mod search;
pub mod storage;
pub mod sync;
pub mod value;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::SearchConfig;
pub use coordinator::{Backends, EngineState, Marketplace};
pub use errors::{EngineError, ValidationError};
pub use listing::{Counter, ListingRecord, RatingRecord, RatingStats};
pub use metrics::LatencyTimer;
pub use ranking::{PopularityWeights, RatingSubmission, RatingSummary};
pub use resilience::retry::RetryConfig;
pub use sanitize::{DocumentSanitizer, DocumentValidator, SanitizeOptions, SanitizedDocument, ValidationPolicy};
pub use search::{SearchParams, SearchResponse};
pub use storage::traits::StorageError;
pub use sync::SyncReport;
pub use value::{Mapping, Value};
