// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Marketplace lifecycle: connect and close.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::errors::{EngineError, Result};
use crate::storage::redis::{self, RedisCache, RedisLock};
use crate::storage::{
    InMemoryCache, InMemoryLock, InMemoryRecordStore, InMemorySearchEngine, RediSearchEngine,
    RecordStore, ResponseCache, SearchEngine, SqlRecordStore, SyncLock,
};

use super::{Backends, EngineState, Marketplace};

impl Marketplace {
    /// Create and start in one step.
    pub async fn connect(config: SearchConfig) -> Result<Self> {
        let market = Self::new(config);
        market.start().await?;
        Ok(market)
    }

    /// Connect to the configured backends.
    ///
    /// Startup flow:
    /// 1. Primary store: SQL when `sql_url` is set, in-process otherwise
    /// 2. Redis (index, cache, lock) when `redis_url` is set, in-process otherwise
    /// 3. Wire the components → Ready
    ///
    /// Connection attempts are retried with the startup backoff. On failure
    /// the marketplace goes back to `Created` and may be started again.
    #[tracing::instrument(skip(self), fields(index = %self.config.index_name))]
    pub async fn start(&self) -> Result<()> {
        match self.state() {
            EngineState::Created => {}
            EngineState::Ready => return Ok(()),
            other => return Err(EngineError::NotReady(other.to_string())),
        }
        let started = std::time::Instant::now();
        let _ = self.state.send(EngineState::Connecting);

        match self.connect_backends().await {
            Ok(backends) => {
                self.install(backends);
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Marketplace started");
                Ok(())
            }
            Err(e) => {
                let _ = self.state.send(EngineState::Created);
                Err(e)
            }
        }
    }

    async fn connect_backends(&self) -> Result<Backends> {
        let store: Arc<dyn RecordStore> = match self.config.sql_url.as_deref() {
            Some(url) => {
                info!("Connecting to SQL primary store...");
                let sql = Arc::new(SqlRecordStore::connect(url).await?);
                *self.sql_store.lock() = Some(sql.clone());
                sql
            }
            None => {
                warn!("No SQL URL configured, using in-process primary store");
                Arc::new(InMemoryRecordStore::new())
            }
        };

        let (engine, cache, lock): (Arc<dyn SearchEngine>, Arc<dyn ResponseCache>, Arc<dyn SyncLock>) =
            match self.config.redis_url.as_deref() {
                Some(url) => {
                    info!("Connecting to Redis...");
                    let connection = redis::connect(url).await?;
                    let namespace = self.config.redis_namespace();
                    (
                        Arc::new(RediSearchEngine::new(connection.clone(), namespace)),
                        Arc::new(RedisCache::new(connection.clone(), namespace)),
                        Arc::new(RedisLock::new(connection, namespace)),
                    )
                }
                None => {
                    warn!("No Redis URL configured, using in-process index, cache and lock");
                    (
                        Arc::new(InMemorySearchEngine::new()),
                        Arc::new(InMemoryCache::new()),
                        Arc::new(InMemoryLock::new()),
                    )
                }
            };

        Ok(Backends {
            store,
            engine,
            cache,
            lock,
        })
    }

    /// Initiate graceful shutdown. New calls fail with `NotReady`; calls
    /// already running finish on the components they hold.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) {
        if self.state() == EngineState::Closed {
            return;
        }
        info!("Closing marketplace...");
        let _ = self.state.send(EngineState::ShuttingDown);

        self.services.write().take();
        let sql = self.sql_store.lock().take();
        if let Some(sql) = sql {
            sql.close().await;
        }

        let _ = self.state.send(EngineState::Closed);
        info!("Marketplace closed");
    }
}
