// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis response cache and sync lock.
//!
//! Both share one [`ConnectionManager`] (it reconnects on its own and is
//! cheap to clone). Keys are namespaced with the configured prefix so a Redis
//! instance can be shared with other applications:
//!
//! ```text
//! {prefix}search:<sha256>   cached SearchResponse JSON   SET .. EX ttl
//! {prefix}lock:sync:<idx>   sync lock token             SET .. NX PX ttl
//! ```
//!
//! Releasing the lock is a compare-and-delete script so a holder whose lease
//! expired can never remove somebody else's lock.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use super::traits::{LockToken, ResponseCache, StorageError, SyncLock};
use crate::resilience::retry::{retry, RetryConfig};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn backend(e: redis::RedisError) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Open a managed connection with startup-mode retry.
pub async fn connect(connection_string: &str) -> Result<ConnectionManager, StorageError> {
    let client =
        Client::open(connection_string).map_err(|e| StorageError::Connection(e.to_string()))?;

    // Fast-fail on a bad URL instead of hanging forever
    retry("redis_connect", &RetryConfig::startup(), || async {
        ConnectionManager::new(client.clone()).await
    })
    .await
    .map_err(|e: redis::RedisError| StorageError::Connection(e.to_string()))
}

pub struct RedisCache {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:search:ab12…")
    prefix: String,
}

impl RedisCache {
    pub fn new(connection: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
        }
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        conn.get(self.prefixed_key(key)).await.map_err(backend)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.prefixed_key(key), value, seconds)
            .await
            .map_err(backend)
    }
}

pub struct RedisLock {
    connection: ConnectionManager,
    prefix: String,
    release: Script,
}

impl RedisLock {
    pub fn new(connection: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    #[inline]
    fn lock_key(&self, name: &str) -> String {
        format!("{}lock:{}", self.prefix, name)
    }
}

#[async_trait]
impl SyncLock for RedisLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, StorageError> {
        let mut conn = self.connection.clone();
        let token = LockToken::generate();

        // SET key token NX PX ttl → "OK" or nil
        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(name))
            .arg(&token.0)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(acquired.map(|_| token))
    }

    async fn release(&self, name: &str, token: &LockToken) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: i64 = self
            .release
            .key(self.lock_key(name))
            .arg(&token.0)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
