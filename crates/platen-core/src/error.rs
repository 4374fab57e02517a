// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for platen.

use thiserror::Error;

/// Top-level error type for all platen operations.
#[derive(Debug, Error)]
pub enum PlatenError {
    // -- Protocol errors --
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not possible: {0}")]
    NotPossible(String),

    #[error("document access error: {0}")]
    DocumentAccess(String),

    // -- Authorization --
    /// No credentials were supplied for an operation that requires them.
    /// Surfaces as HTTP 401 with no IPP body.
    #[error("authentication required")]
    Unauthorized,

    /// Credentials were supplied but the user is not in the required group.
    /// Surfaces as HTTP 403 with no IPP body.
    #[error("forbidden")]
    Forbidden,

    // -- Internal --
    /// A handler violated the documented locking or state discipline.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("server error: {0}")]
    Server(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PlatenError>;
