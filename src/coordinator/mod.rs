// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Marketplace coordinator.
//!
//! The [`Marketplace`] ties the components together behind the core
//! operations: `sync`, `search`, `recompute_popularity`, `submit_rating`,
//! plus the listing lifecycle of [`Catalog`].
//!
//! # Lifecycle
//!
//! ```text
//! Created → Connecting → Ready → ShuttingDown → Closed
//! ```
//!
//! # Example
//!
//! ```
//! use market_search::{Marketplace, SearchConfig};
//! use market_search::coordinator::{Backends, EngineState};
//!
//! let market = Marketplace::from_parts(SearchConfig::default(), Backends::in_memory());
//! assert_eq!(market.state(), EngineState::Ready);
//! ```

mod lifecycle;
mod types;

pub use types::{Backends, EngineState};

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::SearchConfig;
use crate::errors::{EngineError, Result};
use crate::listing::ListingRecord;
use crate::ranking::{
    PopularityUpdate, PopularityUpdater, PopularityWeights, RatingSubmission, RatingSummary,
    ReviewAggregator,
};
use crate::search::{
    IndexSchema, SearchCache, SearchCacheStats, SearchParams, SearchQueryPlanner, SearchResponse,
};
use crate::storage::SqlRecordStore;
use crate::sync::{IndexSynchronizer, SyncReport};
use crate::value::Mapping;

/// Cache key namespace for search responses.
const SEARCH_CACHE_PREFIX: &str = "search:";

/// Wired components, built once per start.
struct Services {
    planner: SearchQueryPlanner,
    synchronizer: Arc<IndexSynchronizer>,
    popularity: Arc<PopularityUpdater>,
    reviews: ReviewAggregator,
    catalog: Catalog,
}

impl Services {
    fn build(config: &Arc<SearchConfig>, backends: Backends) -> Self {
        let timeout = config.operation_timeout();
        let schema = Arc::new(IndexSchema::listings(config.index_name.clone()));

        let cache = SearchCache::new(backends.cache, SEARCH_CACHE_PREFIX, config.cache_ttl(), timeout);
        let planner = SearchQueryPlanner::new(
            backends.engine.clone(),
            cache,
            schema.clone(),
            config.clone(),
        );
        let synchronizer = Arc::new(IndexSynchronizer::new(
            backends.store.clone(),
            backends.engine,
            backends.lock,
            schema,
            config.clone(),
        ));
        let popularity = Arc::new(PopularityUpdater::new(
            backends.store.clone(),
            synchronizer.clone(),
            PopularityWeights::default(),
            timeout,
        ));
        let reviews = ReviewAggregator::new(backends.store.clone(), timeout);
        let catalog = Catalog::new(
            backends.store,
            synchronizer.clone(),
            popularity.clone(),
            config.clone(),
        );

        Self {
            planner,
            synchronizer,
            popularity,
            reviews,
            catalog,
        }
    }
}

/// Search and index maintenance for the listings marketplace.
///
/// `Send + Sync`; share it behind an `Arc`. Operations never hold a lock
/// across an await.
pub struct Marketplace {
    config: Arc<SearchConfig>,

    /// Engine state (broadcast to watchers)
    state: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,

    services: RwLock<Option<Arc<Services>>>,

    /// Kept to close the pool on shutdown
    sql_store: Mutex<Option<Arc<SqlRecordStore>>>,
}

impl Marketplace {
    /// Create an unstarted marketplace. Call [`start`](Self::start) to connect.
    pub fn new(config: SearchConfig) -> Self {
        let (state, state_rx) = watch::channel(EngineState::Created);
        Self {
            config: Arc::new(config),
            state,
            state_rx,
            services: RwLock::new(None),
            sql_store: Mutex::new(None),
        }
    }

    /// Build from already-connected (or in-memory) backends. Ready immediately.
    pub fn from_parts(config: SearchConfig, backends: Backends) -> Self {
        let market = Self::new(config);
        market.install(backends);
        market
    }

    fn install(&self, backends: Backends) {
        let services = Services::build(&self.config, backends);
        *self.services.write() = Some(Arc::new(services));
        let _ = self.state.send(EngineState::Ready);
        info!(index = %self.config.index_name, "Marketplace ready");
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Watch for state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    fn services(&self) -> Result<Arc<Services>> {
        let state = self.state();
        if state != EngineState::Ready {
            return Err(EngineError::NotReady(state.to_string()));
        }
        self.services
            .read()
            .clone()
            .ok_or_else(|| EngineError::NotReady(state.to_string()))
    }

    /// Full resync of the index from the primary store.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.services()?.synchronizer.sync().await
    }

    /// Cached structured search.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        self.services()?.planner.search(params).await
    }

    /// Count a view and refresh the listing's popularity score.
    pub async fn recompute_popularity(&self, id: &str) -> Result<f64> {
        let update: PopularityUpdate = self.services()?.popularity.recompute_popularity(id).await?;
        Ok(update.score)
    }

    pub async fn submit_rating(&self, submission: &RatingSubmission) -> Result<RatingSummary> {
        self.services()?.reviews.submit_rating(submission).await
    }

    pub async fn create_listing(&self, attributes: Mapping) -> Result<ListingRecord> {
        self.services()?.catalog.create_listing(attributes).await
    }

    pub async fn fetch_listing(&self, id: &str) -> Result<ListingRecord> {
        self.services()?.catalog.fetch_listing(id).await
    }

    pub async fn latest_listings(&self) -> Result<Vec<ListingRecord>> {
        self.services()?.catalog.latest_listings().await
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.services()?.catalog.categories().await
    }

    pub async fn confirm_booking(&self, listing_id: &str) -> Result<i64> {
        self.services()?.catalog.confirm_booking(listing_id).await
    }

    /// Search cache counters since start.
    pub fn cache_stats(&self) -> Result<SearchCacheStats> {
        Ok(self.services()?.planner.cache_stats())
    }
}
