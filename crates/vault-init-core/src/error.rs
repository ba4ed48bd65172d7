//! Error types for `vault-init-core`.
//!
//! Variants describe what failed and where, never which key share or token
//! was involved.

use vault_init_storage::StorageError;

/// Errors from calls to the vault HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The client could not be configured.
    #[error("vault client config error: {0}")]
    Config(String),

    /// The request could not be completed (connection refused, TLS, ...).
    #[error("vault network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("vault request timed out")]
    Timeout,

    /// The vault answered with a non-success status.
    #[error("vault API error {status_code}: {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message reported by the vault, or the bare status.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("vault json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from replaying key shares against a sealed vault.
#[derive(Debug, thiserror::Error)]
pub enum UnsealError {
    /// Every share was submitted without the vault reporting unsealed.
    #[error("unseal threshold not reached after {submitted} key submissions ({rejected} rejected)")]
    ThresholdNotReached {
        /// Number of shares submitted.
        submitted: usize,
        /// How many of those the vault rejected.
        rejected: usize,
    },
}

/// Errors that end a single lifecycle pass.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Vault initialization failed.
    #[error("initialization failed: {0}")]
    Initialize(#[source] VaultError),

    /// The freshly created initialization record could not be stored.
    #[error("failed to persist initialization record: {0}")]
    Persist(#[source] StorageError),

    /// No usable initialization record could be loaded.
    #[error("failed to fetch initialization record: {0}")]
    Fetch(#[source] StorageError),

    /// Unsealing did not complete.
    #[error("unseal failed: {0}")]
    Unseal(#[from] UnsealError),
}
