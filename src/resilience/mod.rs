// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience helpers: bounded calls and connection retry.

pub mod retry;
pub mod timeout;
