//! Unified error type for the Slicebox core.
//!
//! One flat enum classifies every failure into the three kinds spec.md §7
//! distinguishes: `Validation` (permanent, surfaced as 4xx), `Transient`
//! (retried by the supervisor tick), and `Internal` (logged, worker
//! restarted). Call sites construct variants through the helper
//! constructors rather than matching on `sqlx`/`reqwest` error internals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SliceboxError {
    /// Rejected SOP class/transfer syntax, malformed DICOM, bad request shape.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A uniqueness/consistency constraint was violated on insert.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Requested row/object does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Bearer token did not match any known box.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Connection refused, read timeout, peer 5xx, DB deadlock — retryable.
    #[error("transient error: {message}")]
    Transient { message: String },

    /// Anything else: logged, worker restarted, no in-memory state assumed.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SliceboxError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True for errors the outgoing-transfer worker should retry rather
    /// than transition the transaction to FAILED (spec.md §7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Internal { .. })
    }

    /// The HTTP status the §6 response-code table assigns to this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Unauthorized { .. } => 401,
            Self::Transient { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SliceboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SliceboxError::transient("timeout").is_retryable());
        assert!(SliceboxError::internal("panic").is_retryable());
        assert!(!SliceboxError::validation("bad syntax").is_retryable());
    }

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(SliceboxError::unauthorized("no token").status_code(), 401);
        assert_eq!(SliceboxError::not_found("no such box").status_code(), 404);
        assert_eq!(SliceboxError::validation("bad syntax").status_code(), 400);
        assert_eq!(SliceboxError::transient("peer down").status_code(), 503);
    }
}
