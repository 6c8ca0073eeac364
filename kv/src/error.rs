//! KV error types.

use thiserror::Error;

/// Errors that can occur in key-value operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// Stored value could not be encoded or decoded.
    #[error("Serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Lock is held by another owner.
    #[error("Lock {key} is held by another owner")]
    LockHeld { key: String },

    /// Lock expired and was taken or removed before release.
    #[error("Lock {key} was lost before release")]
    LockLost { key: String },
}

/// Result type for KV operations.
pub type KvResult<T> = Result<T, KvError>;
