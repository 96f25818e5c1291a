//! Crate-wide error type.
//!
//! Flat enum, `thiserror`-derived, in the shape of `sem_os_core::error::SemOsError`:
//! one variant per error kind in spec §7, plus an `Internal` catch-all for anything
//! that doesn't need its own caller-visible branch.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, BrainyError>;

#[derive(Debug, Error)]
pub enum BrainyError {
    #[error("not found: {id}")]
    NotFound { id: Uuid },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("throttled{}", .backoff_hint.map(|d| format!(" (retry after {d:?})")).unwrap_or_default())]
    Throttled { backoff_hint: Option<std::time::Duration> },

    #[error("transient error: {cause}")]
    Transient { cause: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("corrupted blob {id}: {reason}")]
    CorruptedBlob { id: Uuid, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Retry/backoff classification, consumed by C5 (admission control) to decide
/// whether an error should be retried, backed off, or surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Surfaced to the caller; never retried internally.
    Fatal,
    /// Recovered via C5's backoff; surfaced only once the retry budget is exhausted.
    Throttled,
    /// Retried with exponential backoff up to the retry budget.
    Transient,
}

impl Clone for BrainyError {
    /// Lossy for `Internal`: `anyhow::Error` isn't `Clone`, so its message is
    /// re-wrapped. Needed to let a coalesced fetch error fan out to every
    /// attached caller (see `cache::coalescer`).
    fn clone(&self) -> Self {
        match self {
            BrainyError::NotFound { id } => BrainyError::NotFound { id: *id },
            BrainyError::DimensionMismatch { expected, actual } => {
                BrainyError::DimensionMismatch { expected: *expected, actual: *actual }
            }
            BrainyError::Throttled { backoff_hint } => BrainyError::Throttled { backoff_hint: *backoff_hint },
            BrainyError::Transient { cause } => BrainyError::Transient { cause: cause.clone() },
            BrainyError::DeadlineExceeded => BrainyError::DeadlineExceeded,
            BrainyError::BackendUnavailable(m) => BrainyError::BackendUnavailable(m.clone()),
            BrainyError::CorruptedBlob { id, reason } => {
                BrainyError::CorruptedBlob { id: *id, reason: reason.clone() }
            }
            BrainyError::Cancelled => BrainyError::Cancelled,
            BrainyError::InvalidInput(m) => BrainyError::InvalidInput(m.clone()),
            BrainyError::Internal(e) => BrainyError::Internal(anyhow::anyhow!(e.to_string())),
        }
    }
}

impl BrainyError {
    /// Attaches a human-readable cause to a `Throttled`/`Transient` error
    /// constructed from a raw backend message, without changing its kind.
    pub fn with_cause(self, cause: String) -> Self {
        match self {
            BrainyError::Throttled { backoff_hint } => {
                tracing::trace!(%cause, "throttled");
                BrainyError::Throttled { backoff_hint }
            }
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BrainyError::Throttled { .. } => ErrorKind::Throttled,
            BrainyError::Transient { .. } | BrainyError::BackendUnavailable(_) => {
                ErrorKind::Transient
            }
            BrainyError::NotFound { .. }
            | BrainyError::DimensionMismatch { .. }
            | BrainyError::DeadlineExceeded
            | BrainyError::CorruptedBlob { .. }
            | BrainyError::Cancelled
            | BrainyError::InvalidInput(_)
            | BrainyError::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Classifies a raw backend error message by the substrings spec §4.1 requires
    /// the storage engine to recognize (429, 503, "rate limit", "quota").
    pub fn classify_backend_message(msg: &str) -> ErrorKind {
        let lower = msg.to_ascii_lowercase();
        if lower.contains("429")
            || lower.contains("503")
            || lower.contains("rate limit")
            || lower.contains("quota")
            || lower.contains("throttl")
        {
            ErrorKind::Throttled
        } else {
            ErrorKind::Transient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_throttle_substrings() {
        assert_eq!(
            BrainyError::classify_backend_message("HTTP 429 Too Many Requests"),
            ErrorKind::Throttled
        );
        assert_eq!(
            BrainyError::classify_backend_message("Quota exceeded for bucket"),
            ErrorKind::Throttled
        );
        assert_eq!(
            BrainyError::classify_backend_message("connection reset by peer"),
            ErrorKind::Transient
        );
    }

    #[test]
    fn not_found_is_fatal_never_retried() {
        let err = BrainyError::NotFound { id: Uuid::nil() };
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
