// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index maintenance.
//!
//! Two write paths keep the index in line with the primary store:
//!
//! - **Full resync** ([`IndexSynchronizer::sync`]): read every listing,
//!   sanitize, validate, then replace the index contents. Single-flight per
//!   index through a named [`SyncLock`](crate::storage::SyncLock).
//! - **Incremental upsert** ([`IndexSynchronizer::index_record`]): one
//!   listing, same projection, no delete.
//!
//! Both go through the same [`DocumentSanitizer`](crate::sanitize::DocumentSanitizer),
//! so a document looks identical whichever path wrote it last.

mod synchronizer;

pub use synchronizer::{DocumentIssues, IndexSynchronizer, SyncReport};
