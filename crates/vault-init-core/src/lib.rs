//! Core library for `vault-init`.
//!
//! Contains the vault API seam and its HTTP client, the unseal orchestrator,
//! and the lifecycle controller that ties them to a [`KeyStorage`]. This crate
//! depends on `vault-init-storage` for the storage trait and knows nothing
//! about which backend holds the keys.

pub mod api;
pub mod client;
pub mod controller;
pub mod error;
pub mod unseal;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use api::{HealthState, SECRET_SHARES, SECRET_THRESHOLD, UnsealProgress, VaultApi};
pub use client::{DEFAULT_VAULT_ADDR, VaultClient, VaultClientConfig};
pub use controller::{Controller, ControllerSettings, PassOutcome};
pub use error::{ControllerError, UnsealError, VaultError};
pub use unseal::unseal_from_record;
pub use vault_init_storage::{InitializationRecord, KeyStorage, StorageError};
