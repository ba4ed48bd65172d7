//! Kubernetes API client for reading and writing a single `Secret`.
//!
//! Authenticates with the pod's service-account token and trusts the
//! cluster CA mounted next to it. The kubelet rotates the token file, so it
//! is read again for every request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::StorageError;
use crate::kubernetes::{SecretApi, WriteMode};
use crate::record::SecretData;

/// Where Kubernetes mounts service-account credentials inside a pod.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MERGE_PATCH: &str = "application/merge-patch+json";

/// HTTP client for the in-cluster API server.
pub struct KubeClient {
    base_url: String,
    token_path: PathBuf,
    client: reqwest::Client,
}

impl KubeClient {
    /// Build a client from the standard in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInCluster`] if the service host variables
    /// or the service-account files are absent, and [`StorageError::Backend`]
    /// if the CA bundle cannot be loaded.
    pub fn in_cluster() -> Result<Self, StorageError> {
        Self::from_environment(
            std::env::var("KUBERNETES_SERVICE_HOST").ok(),
            std::env::var("KUBERNETES_SERVICE_PORT").ok(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    /// Build a client from explicit service coordinates and a service-account
    /// directory containing `token` and `ca.crt`.
    ///
    /// # Errors
    ///
    /// See [`KubeClient::in_cluster`].
    pub fn from_environment(
        host: Option<String>,
        port: Option<String>,
        account_dir: &Path,
    ) -> Result<Self, StorageError> {
        let (Some(host), Some(port)) = (non_empty(host), non_empty(port)) else {
            return Err(StorageError::NotInCluster {
                reason: "KUBERNETES_SERVICE_HOST or KUBERNETES_SERVICE_PORT is not set".to_owned(),
            });
        };

        let token_path = account_dir.join("token");
        read_account_file(&token_path)?;
        let ca_pem = read_account_file(&account_dir.join("ca.crt"))?;

        let ca = reqwest::Certificate::from_pem(ca_pem.as_bytes()).map_err(|e| {
            StorageError::Backend {
                reason: format!("invalid cluster CA certificate: {e}"),
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .add_root_certificate(ca)
            .user_agent(concat!("vault-init/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Backend {
                reason: format!("failed to build kubernetes client: {e}"),
            })?;

        Ok(Self::with_client(base_url(&host, &port), token_path, client))
    }

    pub(crate) fn with_client(base_url: String, token_path: PathBuf, client: reqwest::Client) -> Self {
        Self {
            base_url,
            token_path,
            client,
        }
    }

    fn secrets_url(&self, namespace: &str, mode: WriteMode) -> String {
        format!(
            "{}/api/v1/namespaces/{namespace}/secrets{}",
            self.base_url,
            dry_run_query(mode)
        )
    }

    fn secret_url(&self, namespace: &str, name: &str, mode: WriteMode) -> String {
        format!(
            "{}/api/v1/namespaces/{namespace}/secrets/{name}{}",
            self.base_url,
            dry_run_query(mode)
        )
    }

    async fn token(&self) -> Result<String, StorageError> {
        let token = tokio::fs::read_to_string(&self.token_path)
            .await
            .map_err(|e| StorageError::Backend {
                reason: format!(
                    "cannot read service-account token {}: {e}",
                    self.token_path.display()
                ),
            })?;
        Ok(token.trim().to_owned())
    }
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SecretApi for KubeClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StorageError> {
        let resp = self
            .client
            .get(self.secret_url(namespace, name, WriteMode::Apply))
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(network_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;

        let secret: SecretBody = resp.json().await.map_err(|e| StorageError::Corrupt {
            reason: format!("unreadable secret object: {e}"),
        })?;
        from_wire_data(secret.data.unwrap_or_default()).map(Some)
    }

    async fn create(
        &self,
        namespace: &str,
        name: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StorageError> {
        let body = NewSecret {
            api_version: "v1",
            kind: "Secret",
            metadata: ObjectMeta { name, namespace },
            secret_type: "Opaque",
            data: to_wire_data(data),
        };

        let resp = self
            .client
            .post(self.secrets_url(namespace, mode))
            .bearer_auth(self.token().await?)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        if resp.status() == StatusCode::CONFLICT {
            return Err(StorageError::AlreadyExists {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            });
        }
        check_status(resp).await?;
        Ok(())
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StorageError> {
        let body = DataPatch {
            data: to_wire_data(data),
        };
        let payload = serde_json::to_vec(&body).map_err(|e| StorageError::Encoding {
            reason: format!("failed to serialize secret patch: {e}"),
        })?;

        let resp = self
            .client
            .patch(self.secret_url(namespace, name, mode))
            .bearer_auth(self.token().await?)
            .header(reqwest::header::CONTENT_TYPE, MERGE_PATCH)
            .body(payload)
            .send()
            .await
            .map_err(network_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            });
        }
        check_status(resp).await?;
        Ok(())
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct ObjectMeta<'a> {
    name: &'a str,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSecret<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta<'a>,
    #[serde(rename = "type")]
    secret_type: &'static str,
    data: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct DataPatch {
    data: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct SecretBody {
    data: Option<BTreeMap<String, String>>,
}

/// Kubernetes `Status` object returned on failed requests.
#[derive(Deserialize)]
struct StatusBody {
    message: Option<String>,
}

/// Secret `data` travels as base64 strings in JSON.
fn to_wire_data(data: &SecretData) -> BTreeMap<String, String> {
    data.iter()
        .map(|(k, v)| (k.clone(), BASE64.encode(v)))
        .collect()
}

fn from_wire_data(wire: BTreeMap<String, String>) -> Result<SecretData, StorageError> {
    wire.into_iter()
        .map(|(k, v)| {
            BASE64
                .decode(v.as_bytes())
                .map(|bytes| (k.clone(), bytes))
                .map_err(|e| StorageError::Corrupt {
                    reason: format!("secret field '{k}' is not valid base64: {e}"),
                })
        })
        .collect()
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StatusBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    Err(StorageError::Api {
        status_code: status.as_u16(),
        message,
    })
}

#[allow(clippy::needless_pass_by_value)]
fn network_error(e: reqwest::Error) -> StorageError {
    StorageError::Backend {
        reason: format!("kubernetes request failed: {e}"),
    }
}

fn dry_run_query(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Apply => "",
        WriteMode::DryRun => "?dryRun=All",
    }
}

fn base_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn read_account_file(path: &Path) -> Result<String, StorageError> {
    std::fs::read_to_string(path).map_err(|e| StorageError::NotInCluster {
        reason: format!("cannot read {}: {e}", path.display()),
    })
}
