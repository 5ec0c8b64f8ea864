// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! | Concern        | Trait            | Production              | In-process               |
//! |----------------|------------------|-------------------------|--------------------------|
//! | Primary store  | [`RecordStore`]  | [`SqlRecordStore`]      | [`InMemoryRecordStore`]  |
//! | Search index   | [`SearchEngine`] | [`RediSearchEngine`]    | [`InMemorySearchEngine`] |
//! | Response cache | [`ResponseCache`]| [`RedisCache`]          | [`InMemoryCache`]        |
//! | Sync lock      | [`SyncLock`]     | [`RedisLock`]           | [`InMemoryLock`]         |

pub mod memory;
pub mod memory_index;
pub mod redis;
pub mod redisearch;
pub mod sql;
pub mod traits;

pub use memory::{InMemoryCache, InMemoryLock, InMemoryRecordStore};
pub use memory_index::InMemorySearchEngine;
pub use redis::{RedisCache, RedisLock};
pub use redisearch::RediSearchEngine;
pub use sql::SqlRecordStore;
pub use traits::{
    IndexCreation, IndexStats, LockToken, RecordStore, ResponseCache, SearchEngine, StorageError,
    SyncLock,
};
