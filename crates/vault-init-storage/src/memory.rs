//! In-memory key storage.
//!
//! Holds at most one encoded record behind a `RwLock`. Nothing survives a
//! process restart, so this backend is only meant for local development or
//! for running outside Kubernetes.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::record::{self, InitializationRecord, SecretData};
use crate::{KeyStorage, StorageError};

/// Ephemeral key storage backed by a single in-process slot.
///
/// Clones share the same slot.
///
/// # Examples
///
/// ```
/// # use vault_init_storage::{InitializationRecord, KeyStorage, MemoryKeyStorage};
/// # #[tokio::main]
/// # async fn main() {
/// let storage = MemoryKeyStorage::new();
/// let record = InitializationRecord::new(vec!["a".into(), "b".into()], "root".into());
/// storage.persist(&record).await.unwrap();
/// assert_eq!(storage.fetch().await.unwrap(), record);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryKeyStorage {
    slot: Arc<RwLock<Option<SecretData>>>,
    reveal: bool,
}

impl MemoryKeyStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the root token and key shares on every persist.
    ///
    /// Since the record is lost on restart, this is the only way an operator
    /// can recover it when running without durable storage.
    #[must_use]
    pub fn reveal(mut self, reveal: bool) -> Self {
        self.reveal = reveal;
        self
    }
}

impl std::fmt::Debug for MemoryKeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStorage")
            .field("reveal", &self.reveal)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl KeyStorage for MemoryKeyStorage {
    async fn persist(&self, record: &InitializationRecord) -> Result<(), StorageError> {
        let data = record::encode(record)?;
        *self.slot.write().await = Some(data);

        warn!(
            shares = record.keys.len(),
            "initialization record held in memory only, it will be lost on restart"
        );
        if self.reveal {
            info!(root_token = %record.root_token, "root token");
            info!(unseal_keys = ?record.keys, "unseal keys");
        }
        Ok(())
    }

    async fn fetch(&self) -> Result<InitializationRecord, StorageError> {
        let slot = self.slot.read().await;
        let data = slot.as_ref().ok_or(StorageError::NoState)?;
        record::decode(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> InitializationRecord {
        InitializationRecord::new(vec!["a".into(), "b".into(), "c".into()], "abcdefg".into())
    }

    #[tokio::test]
    async fn fetch_before_persist_returns_no_state() {
        let storage = MemoryKeyStorage::new();
        let err = storage.fetch().await.unwrap_err();
        assert!(matches!(err, StorageError::NoState));
    }

    #[tokio::test]
    async fn persist_then_fetch_roundtrip() {
        let storage = MemoryKeyStorage::new();
        storage.persist(&sample()).await.unwrap();
        assert_eq!(storage.fetch().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn persist_overwrites_previous_record() {
        let storage = MemoryKeyStorage::new().reveal(true);
        storage.persist(&sample()).await.unwrap();

        let newer = InitializationRecord::new(vec!["x".into()], "root-2".into());
        storage.persist(&newer).await.unwrap();

        assert_eq!(storage.fetch().await.unwrap(), newer);
    }

    #[tokio::test]
    async fn persist_rejects_unencodable_record() {
        let storage = MemoryKeyStorage::new();
        let bad = InitializationRecord::new(vec!["a,b".into()], "root".into());
        let err = storage.persist(&bad).await.unwrap_err();
        assert!(matches!(err, StorageError::Encoding { .. }));
        assert!(matches!(storage.fetch().await.unwrap_err(), StorageError::NoState));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let storage = MemoryKeyStorage::new();
        let clone = storage.clone();
        storage.persist(&sample()).await.unwrap();
        assert_eq!(clone.fetch().await.unwrap(), sample());
    }
}
