//! HTTP implementation of [`VaultApi`].

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vault_init_storage::InitializationRecord;

use crate::api::{HealthState, SECRET_SHARES, SECRET_THRESHOLD, UnsealProgress, VaultApi};
use crate::error::VaultError;

/// Address used when none is configured.
pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`VaultClient`].
#[derive(Debug, Clone)]
pub struct VaultClientConfig {
    /// Base address of the vault, e.g. `https://127.0.0.1:8200`.
    pub address: String,
    /// Per-request timeout. Default: 10 seconds.
    pub timeout: Duration,
    /// Accept self-signed or otherwise unverifiable vault certificates.
    pub accept_invalid_certs: bool,
}

impl Default for VaultClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_VAULT_ADDR.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

/// Vault HTTP client.
pub struct VaultClient {
    address: String,
    client: reqwest::Client,
}

impl VaultClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if the address is empty and
    /// [`VaultError::Network`] if the HTTP client cannot be built.
    pub fn new(cfg: VaultClientConfig) -> Result<Self, VaultError> {
        let address = cfg.address.trim().trim_end_matches('/').to_owned();
        if address.is_empty() {
            return Err(VaultError::Config("vault address is empty".to_owned()));
        }

        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .user_agent(concat!("vault-init/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(VaultError::Network)?;

        Ok(Self { address, client })
    }

    /// The normalized vault address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/sys/{path}", self.address)
    }

    async fn request<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, VaultError> {
        let resp = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        serde_json::from_str(&text).map_err(VaultError::Json)
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl VaultApi for VaultClient {
    async fn health_check(&self) -> Result<HealthState, VaultError> {
        let resp = self
            .client
            .head(self.url("health"))
            .send()
            .await
            .map_err(transport_error)?;
        Ok(HealthState::from_status_code(resp.status().as_u16()))
    }

    async fn initialize(&self) -> Result<InitializationRecord, VaultError> {
        let body = InitRequest {
            secret_shares: SECRET_SHARES,
            secret_threshold: SECRET_THRESHOLD,
        };
        let resp: InitResponse = self.request(Method::PUT, "init", &body).await?;
        Ok(InitializationRecord::new(resp.keys, resp.root_token))
    }

    async fn unseal(&self, share: &str) -> Result<UnsealProgress, VaultError> {
        let body = UnsealRequest {
            key: share,
            reset: false,
        };
        let resp: UnsealResponse = self.request(Method::PUT, "unseal", &body).await?;
        Ok(resp.into_progress())
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct InitRequest {
    secret_shares: u32,
    secret_threshold: u32,
}

#[derive(Deserialize)]
struct InitResponse {
    keys: Vec<String>,
    root_token: String,
}

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
    reset: bool,
}

#[derive(Deserialize)]
struct UnsealResponse {
    sealed: bool,
    t: u32,
    #[serde(default)]
    progress: u32,
}

impl UnsealResponse {
    /// Once unsealed the vault resets `progress` to zero, so report the
    /// threshold instead to give callers a clean terminal value.
    fn into_progress(self) -> UnsealProgress {
        UnsealProgress {
            sealed: self.sealed,
            provided: if self.sealed { self.progress } else { self.t },
            required: self.t,
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

fn api_error(status: StatusCode, body: &str) -> VaultError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.errors.join("; "))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    VaultError::Api {
        status_code: status.as_u16(),
        message,
    }
}

fn transport_error(e: reqwest::Error) -> VaultError {
    if e.is_timeout() {
        VaultError::Timeout
    } else {
        VaultError::Network(e)
    }
}
