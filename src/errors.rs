// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy.
//!
//! - [`ValidationError`]: missing or malformed caller input, never retryable
//! - [`EngineError::NotFound`]: the referenced listing does not exist
//! - [`EngineError::Dependency`]: store, index or cache unreachable/rejecting
//!
//! Sanitized documents failing validation are not errors: they are logged as
//! index drift and reported in the sync run (unless the strict policy is on).

use thiserror::Error;

use crate::storage::traits::StorageError;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("dependency error: {0}")]
    Dependency(#[from] StorageError),
    #[error("a sync is already running for index '{0}'")]
    SyncInProgress(String),
    #[error("{invalid} of {total} sanitized documents failed validation")]
    StrictValidation { invalid: usize, total: usize },
    #[error("engine not ready (state: {0})")]
    NotReady(String),
}

impl EngineError {
    /// Whether the caller supplied bad input (maps to a 4xx at the edge).
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
