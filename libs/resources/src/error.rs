//! Store error types.

use thiserror::Error;

/// Errors from store operations.
///
/// `NotFound` is an expected condition for weak dependencies; callers
/// check it with [`StoreError::is_not_found`] and fall back to a
/// default value. Everything else aborts the caller's current cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested resource does not exist.
    #[error("resource not found: {namespace}/{kind}/{id}")]
    NotFound {
        namespace: String,
        kind: String,
        id: String,
    },

    /// A transform or write produced a payload of the wrong kind.
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },

    /// Underlying storage failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    /// Returns true for the expected "dependency not yet materialized"
    /// condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(namespace: &str, kind: &str, id: &str) -> Self {
        Self::NotFound {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}
