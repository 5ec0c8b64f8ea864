// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the marketplace coordinator.

use std::sync::Arc;

use crate::storage::{
    InMemoryCache, InMemoryLock, InMemoryRecordStore, InMemorySearchEngine, RecordStore,
    ResponseCache, SearchEngine, SyncLock,
};

/// Marketplace lifecycle state.
///
/// Use [`super::Marketplace::state()`] to check the current state or
/// [`super::Marketplace::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Connecting to the primary store and Redis
    Connecting,
    /// Serving requests
    Ready,
    /// Graceful shutdown in progress
    ShuttingDown,
    /// Connections released; every operation fails with `NotReady`
    Closed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// The four external collaborators, as trait objects.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn RecordStore>,
    pub engine: Arc<dyn SearchEngine>,
    pub cache: Arc<dyn ResponseCache>,
    pub lock: Arc<dyn SyncLock>,
}

impl Backends {
    /// Everything in process. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryRecordStore::new()),
            engine: Arc::new(InMemorySearchEngine::new()),
            cache: Arc::new(InMemoryCache::new()),
            lock: Arc::new(InMemoryLock::new()),
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
