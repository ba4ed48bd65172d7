//! Key storage for `vault-init`.
//!
//! This crate defines the [`KeyStorage`] trait, a place to keep the single
//! [`InitializationRecord`] a vault produces when it is first initialized.
//! Storage only knows the record's byte encoding (see [`record`]); it never
//! interprets the shares or the root token.
//!
//! Two implementations are provided:
//!
//! - [`KubernetesKeyStorage`]: durable, backed by a namespaced Kubernetes `Secret`
//! - [`MemoryKeyStorage`]: ephemeral, for running outside a cluster

mod error;
mod kube_client;
mod kubernetes;
mod memory;
pub mod record;

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod stub_http;

use tracing::info;

pub use error::StorageError;
pub use kube_client::{KubeClient, SERVICE_ACCOUNT_DIR};
pub use kubernetes::{KubernetesKeyStorage, SecretApi, WriteMode};
pub use memory::MemoryKeyStorage;
pub use record::InitializationRecord;

/// Durable or ephemeral home for a vault's initialization record.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait KeyStorage: Send + Sync + 'static {
    /// Store `record`, replacing any record stored before it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Encoding`] if the record cannot be encoded,
    /// or a backend-specific variant if the write fails.
    async fn persist(&self, record: &InitializationRecord) -> Result<(), StorageError>;

    /// Load the most recently persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] or [`StorageError::NoState`] when
    /// nothing has been stored yet, [`StorageError::Corrupt`] if stored data
    /// cannot be decoded, or a backend-specific variant if the read fails.
    async fn fetch(&self) -> Result<InitializationRecord, StorageError>;
}

/// Fall back to [`MemoryKeyStorage`] when durable storage reports
/// [`StorageError::NotInCluster`].
///
/// `reveal` is passed to the memory store (see [`MemoryKeyStorage::reveal`]).
///
/// # Errors
///
/// Any error other than `NotInCluster` is returned unchanged.
pub fn or_ephemeral<S: KeyStorage>(
    durable: Result<S, StorageError>,
    reveal: bool,
) -> Result<Box<dyn KeyStorage>, StorageError> {
    match durable {
        Ok(storage) => Ok(Box::new(storage)),
        Err(StorageError::NotInCluster { reason }) => {
            info!(%reason, "no kubernetes environment detected, using in-memory key storage");
            Ok(Box::new(MemoryKeyStorage::new().reveal(reveal)))
        }
        Err(e) => Err(e),
    }
}
