//! Store error types.

use hexkv_common::error::HexError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot serve requests.
    #[error("store '{store}' unavailable: {reason}")]
    Unavailable {
        /// Adapter name.
        store: String,
        /// Why the call failed.
        reason: String,
    },

    /// A write batch was rejected as a whole; nothing was applied.
    #[error("write batch of {ops} operations rejected: {reason}")]
    BatchRejected {
        /// Number of operations in the batch.
        ops: usize,
        /// Why the batch was rejected.
        reason: String,
    },

    /// The store holds bytes it cannot return intact.
    #[error("store data corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },
}

impl StoreError {
    /// Creates an unavailability error.
    pub fn unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for HexError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupted { reason } => HexError::Corruption { message: reason },
            other => HexError::StoreUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
