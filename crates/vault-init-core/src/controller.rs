//! The init/unseal lifecycle controller.
//!
//! One pass of the controller is:
//!
//! 1. **Wait for health**: probe until the vault answers, sleeping
//!    `retry_delay` after each transport error. Any classification, including
//!    `Unknown`, ends the wait.
//! 2. **Uninitialized**: initialize, persist the record, then unseal with it.
//! 3. **Sealed**: fetch the persisted record and unseal with it.
//! 4. **Active / Standby / Unknown**: nothing to do.
//!
//! [`Controller::run`] repeats passes every `interval` until shutdown, so a
//! vault that restarts and comes back sealed is unsealed again without any
//! external trigger. A failed pass is logged and the loop continues.
//!
//! A record that could not be persisted is kept in memory, and every later
//! pass tries to persist it before doing anything else.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};
use vault_init_storage::{InitializationRecord, KeyStorage, StorageError};

use crate::api::{HealthState, UnsealProgress, VaultApi};
use crate::error::ControllerError;
use crate::unseal::unseal_from_record;

/// Timing for the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Delay between health probes while the vault is unreachable.
    pub retry_delay: Duration,
    /// Delay between passes.
    pub interval: Duration,
    /// Extra persist attempts after the first one fails.
    pub persist_retries: u32,
    /// Backoff before the first persist retry, doubled for each later one.
    pub persist_backoff: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            interval: Duration::from_secs(5),
            persist_retries: 3,
            persist_backoff: Duration::from_secs(1),
        }
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The vault was initialized, its record persisted, and it was unsealed.
    Initialized(UnsealProgress),
    /// A sealed vault was unsealed from the persisted record.
    Unsealed(UnsealProgress),
    /// The vault needed nothing.
    Idle(HealthState),
    /// Shutdown was requested while waiting for the vault.
    Shutdown,
}

/// Drives a single vault through initialization and unsealing.
pub struct Controller {
    vault: Arc<dyn VaultApi>,
    storage: Arc<dyn KeyStorage>,
    settings: ControllerSettings,
    unsaved: Mutex<Option<InitializationRecord>>,
}

impl Controller {
    /// Create a controller over the given vault client and key storage.
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultApi>,
        storage: Arc<dyn KeyStorage>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            vault,
            storage,
            settings,
            unsaved: Mutex::new(None),
        }
    }

    /// Run passes until `shutdown` changes or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = millis(self.settings.interval),
            "lifecycle controller started"
        );

        loop {
            match self.run_pass(&mut shutdown).await {
                Ok(PassOutcome::Shutdown) => break,
                Ok(outcome) => debug!(?outcome, "pass complete"),
                Err(e @ ControllerError::Persist(_)) => {
                    error!(error = %e, "pass failed, initialization record is not stored");
                }
                Err(e) => warn!(error = %e, "pass failed, will retry next interval"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.settings.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("lifecycle controller shutting down");
    }

    /// Run one pass: wait for health, persist any record an earlier pass
    /// failed to store, then act on the classified state.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Persist`] if an unsaved record still cannot be
    /// stored. Otherwise see [`Controller::initialize`] and
    /// [`Controller::unseal_from_storage`].
    pub async fn run_pass(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PassOutcome, ControllerError> {
        let Some(state) = self.wait_for_health(shutdown).await else {
            return Ok(PassOutcome::Shutdown);
        };

        self.persist_unsaved().await?;

        match state {
            HealthState::Uninitialized => self.initialize().await.map(PassOutcome::Initialized),
            HealthState::Sealed => self
                .unseal_from_storage()
                .await
                .map(PassOutcome::Unsealed),
            HealthState::Active | HealthState::Standby | HealthState::Unknown(_) => {
                Ok(PassOutcome::Idle(state))
            }
        }
    }

    /// Probe until the vault answers.
    ///
    /// Returns `None` only if shutdown is signalled during a retry delay.
    pub async fn wait_for_health(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<HealthState> {
        loop {
            match self.vault.health_check().await {
                Ok(state) => {
                    debug!("vault is {state}");
                    return Some(state);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_ms = millis(self.settings.retry_delay),
                        "vault health check failed"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(self.settings.retry_delay) => {}
                        _ = shutdown.changed() => return None,
                    }
                }
            }
        }
    }

    /// Initialize the vault, persist the resulting record, and unseal.
    ///
    /// Initialization is not retried. Persisting is retried with exponential
    /// backoff, since the record exists nowhere else. If it still fails, the
    /// record is kept for the next pass and the vault is left sealed.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Initialize`] if the vault refuses or is unreachable.
    /// - [`ControllerError::Persist`] if every persist attempt failed.
    /// - [`ControllerError::Unseal`] if the new shares did not unseal the vault.
    pub async fn initialize(&self) -> Result<UnsealProgress, ControllerError> {
        info!("initializing vault");
        let record = self
            .vault
            .initialize()
            .await
            .map_err(ControllerError::Initialize)?;

        info!(shares = record.keys.len(), "storing vault keys");
        if let Err(e) = self.persist_with_retry(&record).await {
            if !e.is_permanent() {
                *self.unsaved.lock().await = Some(record);
            }
            return Err(ControllerError::Persist(e));
        }

        Ok(unseal_from_record(self.vault.as_ref(), &record).await?)
    }

    /// Fetch the persisted record and unseal with it.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Fetch`] if no record can be loaded.
    /// - [`ControllerError::Unseal`] if its shares did not unseal the vault.
    pub async fn unseal_from_storage(&self) -> Result<UnsealProgress, ControllerError> {
        let record = self.storage.fetch().await.map_err(ControllerError::Fetch)?;
        Ok(unseal_from_record(self.vault.as_ref(), &record).await?)
    }

    async fn persist_unsaved(&self) -> Result<(), ControllerError> {
        let mut unsaved = self.unsaved.lock().await;
        let Some(record) = unsaved.as_ref() else {
            return Ok(());
        };

        warn!(
            shares = record.keys.len(),
            "initialization record from an earlier pass is not stored yet, retrying"
        );
        self.persist_with_retry(record)
            .await
            .map_err(ControllerError::Persist)?;
        *unsaved = None;
        info!("initialization record stored");
        Ok(())
    }

    async fn persist_with_retry(&self, record: &InitializationRecord) -> Result<(), StorageError> {
        let mut attempt = 0u32;
        loop {
            match self.storage.persist(record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.settings.persist_retries && !e.is_permanent() => {
                    // Exponential backoff: base, 2x base, 4x base, ...
                    let backoff = self
                        .settings
                        .persist_backoff
                        .saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    warn!(
                        attempt,
                        max = self.settings.persist_retries,
                        backoff_ms = millis(backoff),
                        error = %e,
                        "failed to persist initialization record, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
