// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record sanitization and validation.
//!
//! Canonical records are free-form; the index needs flat-ish documents with
//! safe keys, primitive leaves and a string `id`. Sanitization is pure and
//! idempotent: sanitizing a sanitized document changes nothing.
//!
//! ```text
//! ListingRecord ──► listing projection ──► generic pass ──► SanitizedDocument
//!                   (location, tags, ...)  (keys, depth,       │
//!                                            empties)           ▼
//!                                                       DocumentValidator
//! ```

mod listing;
mod sanitizer;
mod validator;

pub use sanitizer::{DocumentSanitizer, SanitizeOptions, SanitizedDocument, ID_FIELD};
pub use validator::{DocumentValidator, ValidationPolicy, ValidationReport};
