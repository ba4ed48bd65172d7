//! Storage error types.
//!
//! Every variant carries enough context to diagnose the problem without a
//! debugger. None of them ever carries key material.

/// Errors that can occur while persisting or fetching initialization records.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The Kubernetes service-account environment is absent. Callers fall back
    /// to ephemeral storage on this variant.
    #[error("kubernetes environment not detected: {reason}")]
    NotInCluster { reason: String },

    /// The backing secret does not exist yet.
    #[error("secret '{namespace}/{name}' not found")]
    NotFound { namespace: String, name: String },

    /// The in-memory store has not been written to.
    #[error("no initialization record has been stored")]
    NoState,

    /// A create was rejected because the secret already exists.
    #[error("secret '{namespace}/{name}' already exists")]
    AlreadyExists { namespace: String, name: String },

    /// A record could not be encoded without loss.
    #[error("failed to encode initialization record: {reason}")]
    Encoding { reason: String },

    /// Stored data could not be decoded back into a record.
    #[error("stored initialization record is corrupt: {reason}")]
    Corrupt { reason: String },

    /// The Kubernetes API answered with a non-success status.
    #[error("kubernetes API error {status_code}: {message}")]
    Api { status_code: u16, message: String },

    /// Transport, credential, or client construction failure.
    #[error("storage backend failure: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    /// Whether repeating the same operation can only fail the same way.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }
}
