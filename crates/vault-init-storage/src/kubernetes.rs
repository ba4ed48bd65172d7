//! Durable key storage in a Kubernetes `Secret`.
//!
//! The record is written to a single named secret. The first persist creates
//! it, and later persists merge-patch its `data` in place. The raw API calls
//! sit behind [`SecretApi`], so the storage logic can be tested without a
//! cluster.

use tracing::{debug, info};

use crate::kube_client::KubeClient;
use crate::record::{self, InitializationRecord, SecretData};
use crate::{KeyStorage, StorageError};

/// Whether a write is applied or only validated by the API server.
///
/// A dry run goes through authentication, authorization, and admission like a
/// real write, but nothing is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Apply,
    DryRun,
}

/// Minimal byte-map contract over the cluster's secret store.
#[async_trait::async_trait]
pub trait SecretApi: Send + Sync + 'static {
    /// Read a secret's data. Returns `Ok(None)` if the secret does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Api`] or [`StorageError::Backend`] on failure.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StorageError>;

    /// Create a secret holding `data`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the secret is already
    /// present, or another variant on failure.
    async fn create(
        &self,
        namespace: &str,
        name: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StorageError>;

    /// Replace the given fields of an existing secret's data.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the secret does not exist, or
    /// another variant on failure.
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StorageError>;
}

/// Key storage backed by a namespaced Kubernetes secret.
#[derive(Debug)]
pub struct KubernetesKeyStorage<A = KubeClient> {
    api: A,
    name: String,
    namespace: String,
}

impl KubernetesKeyStorage<KubeClient> {
    /// Connect using the pod's service-account credentials and verify that
    /// the secret can be read and written.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotInCluster`] if no in-cluster credentials exist.
    /// - Any other variant if the API server rejects the access check.
    pub async fn in_cluster(name: &str, namespace: &str) -> Result<Self, StorageError> {
        let client = KubeClient::in_cluster()?;
        let storage = Self::new(client, name, namespace);
        storage.verify_access().await?;
        info!(namespace, name, "using kubernetes secret for key storage");
        Ok(storage)
    }
}

impl<A: SecretApi> KubernetesKeyStorage<A> {
    /// Wrap an existing [`SecretApi`].
    pub fn new(api: A, name: &str, namespace: &str) -> Self {
        Self {
            api,
            name: name.to_owned(),
            namespace: namespace.to_owned(),
        }
    }

    /// Check that the backing secret can be read and written, without
    /// storing anything. A missing secret is fine.
    ///
    /// Runs before the vault is initialized: a store that can read but not
    /// write would otherwise lose the only copy of a fresh record.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the read or the dry-run write is
    /// rejected.
    pub async fn verify_access(&self) -> Result<(), StorageError> {
        let exists = self.api.get(&self.namespace, &self.name).await?.is_some();
        self.write(&SecretData::new(), WriteMode::DryRun).await?;
        debug!(namespace = %self.namespace, name = %self.name, exists, "key storage secret access verified");
        Ok(())
    }

    /// Create the secret, or merge `data` into it if it already exists.
    async fn write(&self, data: &SecretData, mode: WriteMode) -> Result<Written, StorageError> {
        match self.api.create(&self.namespace, &self.name, data, mode).await {
            Ok(()) => Ok(Written::Created),
            Err(StorageError::AlreadyExists { .. }) => {
                self.api.patch(&self.namespace, &self.name, data, mode).await?;
                Ok(Written::Updated)
            }
            Err(e) => Err(e),
        }
    }
}

enum Written {
    Created,
    Updated,
}

#[async_trait::async_trait]
impl<A: SecretApi> KeyStorage for KubernetesKeyStorage<A> {
    async fn persist(&self, record: &InitializationRecord) -> Result<(), StorageError> {
        let data = record::encode(record)?;

        let action = match self.write(&data, WriteMode::Apply).await? {
            Written::Created => "created",
            Written::Updated => "updated",
        };
        info!(namespace = %self.namespace, name = %self.name, "key storage secret {action}");
        Ok(())
    }

    async fn fetch(&self) -> Result<InitializationRecord, StorageError> {
        let data = self
            .api
            .get(&self.namespace, &self.name)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
            })?;
        record::decode(&data)
    }
}
