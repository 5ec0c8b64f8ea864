// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::errors::{EngineError, Result};
use crate::listing::ListingRecord;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::timeout::with_timeout;
use crate::sanitize::{
    DocumentSanitizer, DocumentValidator, SanitizeOptions, SanitizedDocument, ValidationPolicy,
};
use crate::search::IndexSchema;
use crate::storage::{IndexCreation, RecordStore, SearchEngine, SyncLock};

/// Validation issues of one sanitized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIssues {
    pub id: String,
    pub issues: Vec<String>,
}

/// Outcome of one full resync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub index: String,
    /// Document count reported by the engine once it settled
    pub documents_indexed: u64,
    pub invalid_document_count: usize,
    pub issues: Vec<DocumentIssues>,
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncReport {
    fn empty(index: &str, duration: Duration) -> Self {
        Self {
            index: index.to_string(),
            documents_indexed: 0,
            invalid_document_count: 0,
            issues: Vec::new(),
            duration,
        }
    }
}

pub struct IndexSynchronizer {
    store: Arc<dyn RecordStore>,
    engine: Arc<dyn SearchEngine>,
    lock: Arc<dyn SyncLock>,
    schema: Arc<IndexSchema>,
    config: Arc<SearchConfig>,
    sanitizer: DocumentSanitizer,
    validator: DocumentValidator,
}

impl IndexSynchronizer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: Arc<dyn SearchEngine>,
        lock: Arc<dyn SyncLock>,
        schema: Arc<IndexSchema>,
        config: Arc<SearchConfig>,
    ) -> Self {
        let sanitizer = DocumentSanitizer::new(SanitizeOptions {
            max_depth: config.max_depth,
            remove_empty: config.remove_empty,
            ..SanitizeOptions::default()
        });
        let validator = DocumentValidator::new(config.max_depth);

        Self {
            store,
            engine,
            lock,
            schema,
            config,
            sanitizer,
            validator,
        }
    }

    pub fn sanitizer(&self) -> &DocumentSanitizer {
        &self.sanitizer
    }

    /// Replace the index contents with the sanitized form of every listing.
    ///
    /// Fails with [`EngineError::SyncInProgress`] when another run holds the
    /// index lock. The lock is released whatever the outcome.
    pub async fn sync(&self) -> Result<SyncReport> {
        let index = self.schema.name.as_str();
        let lock_name = format!("sync:{index}");
        let timeout = self.config.operation_timeout();

        let token = with_timeout(
            "lock.acquire",
            timeout,
            self.lock.try_acquire(&lock_name, self.config.sync_lock_ttl()),
        )
        .await?;
        let Some(token) = token else {
            metrics::record_sync_contention(index);
            warn!(index = %index, "Sync rejected, another run holds the lock");
            return Err(EngineError::SyncInProgress(index.to_string()));
        };

        let result = self.run(index).await;

        if let Err(e) = with_timeout("lock.release", timeout, self.lock.release(&lock_name, &token)).await {
            // The lease expires on its own
            warn!(index = %index, error = %e, "Failed to release sync lock");
        }

        result
    }

    async fn run(&self, index: &str) -> Result<SyncReport> {
        let _timer = LatencyTimer::new("sync");
        let started = Instant::now();
        let timeout = self.config.operation_timeout();

        let records = with_timeout("store.all", timeout, self.store.all()).await?;
        if records.is_empty() {
            info!(index = %index, "Primary store is empty, nothing to index");
            let report = SyncReport::empty(index, started.elapsed());
            metrics::record_sync_run(index, 0, 0, report.duration);
            return Ok(report);
        }

        let documents = self.sanitizer.sanitize_records(&records);
        let issues = self.validate_all(&documents);

        if !issues.is_empty() {
            match self.config.validation_policy {
                ValidationPolicy::Strict => {
                    warn!(
                        index = %index,
                        invalid = issues.len(),
                        total = documents.len(),
                        "Strict validation failed, index left untouched"
                    );
                    return Err(EngineError::StrictValidation {
                        invalid: issues.len(),
                        total: documents.len(),
                    });
                }
                ValidationPolicy::Lenient => {
                    for doc in &issues {
                        warn!(index = %index, id = %doc.id, issues = ?doc.issues, "Index drift: document failed validation");
                    }
                }
            }
        }

        match with_timeout("index.create", timeout, self.engine.ensure_index(&self.schema)).await? {
            IndexCreation::Created => info!(index = %index, "Created search index"),
            IndexCreation::AlreadyExists => debug!(index = %index, "Search index already exists"),
        }

        with_timeout("index.delete_all", timeout, self.engine.delete_all(index)).await?;
        let submitted =
            with_timeout("index.add", timeout, self.engine.add_documents(index, &documents)).await?;

        let indexed = self.await_settled(index, submitted as u64).await?;

        let report = SyncReport {
            index: index.to_string(),
            documents_indexed: indexed,
            invalid_document_count: issues.len(),
            issues,
            duration: started.elapsed(),
        };
        metrics::record_sync_run(
            index,
            report.documents_indexed,
            report.invalid_document_count,
            report.duration,
        );
        info!(
            index = %index,
            documents = report.documents_indexed,
            invalid = report.invalid_document_count,
            duration_ms = report.duration.as_millis() as u64,
            "Sync complete"
        );
        Ok(report)
    }

    fn validate_all(&self, documents: &[SanitizedDocument]) -> Vec<DocumentIssues> {
        documents
            .iter()
            .filter_map(|doc| {
                let report = self.validator.validate(doc);
                (!report.valid).then(|| DocumentIssues {
                    id: doc.id().unwrap_or_default().to_string(),
                    issues: report.issues,
                })
            })
            .collect()
    }

    /// Poll index stats until the engine has caught up with `expected`
    /// documents, or the attempts run out.
    async fn await_settled(&self, index: &str, expected: u64) -> Result<u64> {
        let timeout = self.config.operation_timeout();
        let attempts = self.config.stats_poll_attempts.max(1);
        let mut observed = 0;

        for attempt in 1..=attempts {
            let stats = with_timeout("index.stats", timeout, self.engine.stats(index)).await?;
            observed = stats.document_count;
            if !stats.is_indexing && observed >= expected {
                return Ok(observed);
            }
            debug!(index = %index, attempt, observed, expected, "Waiting for index to settle");
            tokio::time::sleep(self.config.stats_poll_interval()).await;
        }

        warn!(index = %index, observed, expected, "Index did not settle before polling gave up");
        Ok(observed)
    }

    /// Write one listing into the index without touching the others.
    pub async fn index_record(&self, record: &ListingRecord) -> Result<SanitizedDocument> {
        let index = self.schema.name.as_str();
        let document = self.sanitizer.sanitize_record(record);

        let report = self.validator.validate(&document);
        if !report.valid {
            warn!(index = %index, id = %record.id, issues = ?report.issues, "Index drift: document failed validation");
        }

        with_timeout(
            "index.add",
            self.config.operation_timeout(),
            self.engine.add_documents(index, std::slice::from_ref(&document)),
        )
        .await?;
        metrics::record_incremental_upsert(index);
        debug!(index = %index, id = %record.id, "Incremental index upsert");
        Ok(document)
    }
}
