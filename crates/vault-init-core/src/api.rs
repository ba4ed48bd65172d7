//! The three vault operations the controller depends on.

use vault_init_storage::InitializationRecord;

use crate::error::VaultError;

/// Total key shares requested at initialization.
pub const SECRET_SHARES: u32 = 5;

/// Shares required to unseal.
pub const SECRET_THRESHOLD: u32 = 3;

/// Classified health of the vault, produced fresh by every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Initialized, unsealed, and serving.
    Active,
    /// Unsealed passive replica.
    Standby,
    /// Never initialized.
    Uninitialized,
    /// Initialized but locked.
    Sealed,
    /// Any other status code.
    Unknown(u16),
}

impl HealthState {
    /// Classify a `sys/health` status code.
    #[must_use]
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200 => Self::Active,
            429 => Self::Standby,
            501 => Self::Uninitialized,
            503 => Self::Sealed,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("initialized and unsealed"),
            Self::Standby => f.write_str("unsealed and in standby mode"),
            Self::Uninitialized => f.write_str("not initialized"),
            Self::Sealed => f.write_str("sealed"),
            Self::Unknown(code) => write!(f, "in an unknown state (status code {code})"),
        }
    }
}

/// Vault response to a single key-share submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsealProgress {
    /// Whether the vault is still sealed.
    pub sealed: bool,
    /// Valid shares accumulated so far. Equals `required` once unsealed.
    pub provided: u32,
    /// Shares needed to unseal.
    pub required: u32,
}

/// Client for the vault's lifecycle endpoints.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait VaultApi: Send + Sync + 'static {
    /// Probe and classify the vault's health.
    ///
    /// An unrecognized status code is `Ok(HealthState::Unknown(code))`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Network`] or [`VaultError::Timeout`] only when
    /// the probe itself could not complete.
    async fn health_check(&self) -> Result<HealthState, VaultError>;

    /// Initialize the vault with [`SECRET_SHARES`] shares and a threshold of
    /// [`SECRET_THRESHOLD`]. Must only be called on an uninitialized vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Api`] if the vault refuses (for example because
    /// it is already initialized) and [`VaultError::Json`] if the response
    /// cannot be decoded.
    async fn initialize(&self) -> Result<InitializationRecord, VaultError>;

    /// Submit one key share.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Api`] if the vault rejects the share or is not
    /// sealed, and [`VaultError::Json`] if the response cannot be decoded.
    async fn unseal(&self, share: &str) -> Result<UnsealProgress, VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_classify() {
        assert_eq!(HealthState::from_status_code(200), HealthState::Active);
        assert_eq!(HealthState::from_status_code(429), HealthState::Standby);
        assert_eq!(HealthState::from_status_code(501), HealthState::Uninitialized);
        assert_eq!(HealthState::from_status_code(503), HealthState::Sealed);
    }

    #[test]
    fn other_codes_are_unknown_with_code() {
        for code in [204, 418, 472, 473, 500, 502] {
            assert_eq!(HealthState::from_status_code(code), HealthState::Unknown(code));
        }
    }

    #[test]
    fn display_mentions_unknown_code() {
        assert_eq!(
            HealthState::Unknown(418).to_string(),
            "in an unknown state (status code 418)"
        );
    }
}
