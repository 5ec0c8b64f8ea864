// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-call deadline for external dependencies.
//!
//! Every call to the primary store, the search engine or the cache goes
//! through [`with_timeout`]. A stuck dependency fails that one call with
//! [`StorageError::Timeout`]; nothing else waits on it.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::metrics;
use crate::storage::traits::StorageError;

pub async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => {
            if result.is_err() {
                metrics::record_dependency_error(operation);
            }
            result
        }
        Err(_) => {
            metrics::record_timeout(operation);
            warn!(operation, limit_ms = limit.as_millis() as u64, "Dependency call timed out");
            Err(StorageError::Timeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_result() {
        let ok = with_timeout("store.get", Duration::from_secs(1), async { Ok::<_, StorageError>(5) }).await;
        assert_eq!(ok, Ok(5));

        let err = with_timeout("store.get", Duration::from_secs(1), async {
            Err::<(), _>(StorageError::Backend("boom".into()))
        })
        .await;
        assert_eq!(err, Err(StorageError::Backend("boom".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_call_times_out() {
        let result = with_timeout("index.search", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, StorageError>(())
        })
        .await;

        assert_eq!(
            result,
            Err(StorageError::Timeout {
                operation: "index.search".into(),
                after_ms: 50
            })
        );
    }
}
