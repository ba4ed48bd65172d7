//! Scripted fakes for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use vault_init_storage::{InitializationRecord, KeyStorage, MemoryKeyStorage, StorageError};

use crate::api::{HealthState, UnsealProgress, VaultApi};
use crate::error::VaultError;

pub(crate) fn sealed(provided: u32) -> Result<UnsealProgress, VaultError> {
    Ok(UnsealProgress {
        sealed: true,
        provided,
        required: 3,
    })
}

pub(crate) fn unsealed() -> Result<UnsealProgress, VaultError> {
    Ok(UnsealProgress {
        sealed: false,
        provided: 3,
        required: 3,
    })
}

pub(crate) fn rejected() -> Result<UnsealProgress, VaultError> {
    Err(api_error(400, "invalid key"))
}

pub(crate) fn api_error(status_code: u16, message: &str) -> VaultError {
    VaultError::Api {
        status_code,
        message: message.to_owned(),
    }
}

pub(crate) fn record(keys: &[&str], root: &str) -> InitializationRecord {
    InitializationRecord::new(keys.iter().map(|k| (*k).to_owned()).collect(), root.to_owned())
}

/// Vault fake that answers from per-operation queues and records every call.
///
/// An exhausted health queue answers `Active`; exhausted init and unseal
/// queues answer with an API error.
#[derive(Default)]
pub(crate) struct ScriptedVault {
    health: Mutex<VecDeque<Result<HealthState, VaultError>>>,
    init: Mutex<VecDeque<Result<InitializationRecord, VaultError>>>,
    unseal: Mutex<VecDeque<Result<UnsealProgress, VaultError>>>,
    submitted: Mutex<Vec<String>>,
    health_calls: AtomicUsize,
    init_calls: AtomicUsize,
}

impl ScriptedVault {
    pub(crate) fn health(self, answers: impl IntoIterator<Item = Result<HealthState, VaultError>>) -> Self {
        self.health.lock().unwrap().extend(answers);
        self
    }

    pub(crate) fn init(self, answer: Result<InitializationRecord, VaultError>) -> Self {
        self.init.lock().unwrap().push_back(answer);
        self
    }

    pub(crate) fn unseal(self, answers: impl IntoIterator<Item = Result<UnsealProgress, VaultError>>) -> Self {
        self.unseal.lock().unwrap().extend(answers);
        self
    }

    pub(crate) fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VaultApi for ScriptedVault {
    async fn health_check(&self) -> Result<HealthState, VaultError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(HealthState::Active))
    }

    async fn initialize(&self) -> Result<InitializationRecord, VaultError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(400, "Vault is already initialized")))
    }

    async fn unseal(&self, share: &str) -> Result<UnsealProgress, VaultError> {
        self.submitted
            .lock()
            .unwrap()
            .push(share.to_owned());
        self.unseal
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(400, "vault is not sealed")))
    }
}

/// Memory storage whose first `failures` persists fail.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryKeyStorage,
    failures: AtomicUsize,
    persist_calls: AtomicUsize,
}

impl FlakyStorage {
    pub(crate) fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub(crate) fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl KeyStorage for FlakyStorage {
    async fn persist(&self, record: &InitializationRecord) -> Result<(), StorageError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Api {
                status_code: 500,
                message: "etcdserver: request timed out".to_owned(),
            });
        }
        self.inner.persist(record).await
    }

    async fn fetch(&self) -> Result<InitializationRecord, StorageError> {
        self.inner.fetch().await
    }
}
