//! Runtime configuration for `vault-init`.
//!
//! Every setting is a CLI flag, and most can also come from the environment:
//!
//! - `VAULT_ADDR`: vault address (default: `http://127.0.0.1:8200`)
//! - `VAULT_INIT_SECRET_NAME`: secret holding the keys (default: `vault-keys`)
//! - `VAULT_INIT_NAMESPACE`: namespace of that secret (default: `default`)
//! - `DEBUG`: `true` (any case) enables debug logging and, outside a cluster,
//!   logs the generated keys
//! - `VAULT_INIT_LOG_LEVEL`: log filter (default: `info`, or `debug` with `DEBUG`)
//! - `VAULT_INIT_TLS_VERIFY`: verify the vault's certificate (default: `false`)

use std::convert::Infallible;
use std::time::Duration;

use clap::Parser;
use vault_init_core::{ControllerSettings, DEFAULT_VAULT_ADDR, VaultClientConfig};

/// Initialize and unseal a vault, keeping its keys in a Kubernetes secret.
#[derive(Debug, Clone, Parser)]
#[command(name = "vault-init", version)]
pub struct Config {
    /// Address of the vault to manage.
    #[arg(long, env = "VAULT_ADDR", default_value = DEFAULT_VAULT_ADDR)]
    pub vault_addr: String,

    /// Name of the Kubernetes secret that stores the keys.
    #[arg(long, env = "VAULT_INIT_SECRET_NAME", default_value = "vault-keys")]
    pub secret_name: String,

    /// Namespace of the key secret.
    #[arg(long, env = "VAULT_INIT_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Debug logging. Outside a cluster, also log the generated keys.
    #[arg(long, env = "DEBUG", value_parser = parse_flag)]
    pub debug: bool,

    /// Log filter directive, e.g. `info` or `vault_init_core=debug`.
    #[arg(long, env = "VAULT_INIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Seconds between health probes while the vault is unreachable.
    #[arg(long, default_value = "1")]
    pub retry_delay_secs: u64,

    /// Seconds between lifecycle passes.
    #[arg(long, default_value = "5")]
    pub interval_secs: u64,

    /// Timeout for each vault request, in seconds.
    #[arg(long, default_value = "10")]
    pub request_timeout_secs: u64,

    /// Verify the vault's TLS certificate instead of accepting any.
    #[arg(long, env = "VAULT_INIT_TLS_VERIFY", value_parser = parse_flag)]
    pub tls_verify: bool,
}

impl Config {
    /// Default log filter when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        match &self.log_level {
            Some(level) => level.as_str(),
            None if self.debug => "debug",
            None => "info",
        }
    }

    #[must_use]
    pub fn vault_client_config(&self) -> VaultClientConfig {
        VaultClientConfig {
            address: self.vault_addr.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            accept_invalid_certs: !self.tls_verify,
        }
    }

    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            interval: Duration::from_secs(self.interval_secs),
            ..ControllerSettings::default()
        }
    }
}

/// Only `true`, in any case, turns a flag on from the environment.
#[allow(clippy::unnecessary_wraps)]
fn parse_flag(value: &str) -> Result<bool, Infallible> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let argv = std::iter::once("vault-init").chain(args.iter().copied());
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = parse(&[
            "--vault-addr",
            "https://vault.vault.svc:8200",
            "--secret-name",
            "unseal-keys",
            "--namespace",
            "vault",
            "--retry-delay-secs",
            "2",
            "--interval-secs",
            "30",
            "--request-timeout-secs",
            "3",
            "--tls-verify",
        ]);

        assert_eq!(cfg.secret_name, "unseal-keys");
        assert_eq!(cfg.namespace, "vault");

        let client = cfg.vault_client_config();
        assert_eq!(client.address, "https://vault.vault.svc:8200");
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert!(!client.accept_invalid_certs);

        let settings = cfg.controller_settings();
        assert_eq!(settings.retry_delay, Duration::from_secs(2));
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.persist_retries, ControllerSettings::default().persist_retries);
    }

    #[test]
    fn debug_raises_default_log_level() {
        assert_eq!(parse(&[]).log_filter(), "info");
        assert_eq!(parse(&["--debug"]).log_filter(), "debug");
    }

    #[test]
    fn explicit_log_level_wins_over_debug() {
        let cfg = parse(&["--debug", "--log-level", "warn"]);
        assert!(cfg.debug);
        assert_eq!(cfg.log_filter(), "warn");
    }

    #[test]
    fn invalid_certs_accepted_unless_verifying() {
        assert!(parse(&[]).vault_client_config().accept_invalid_certs);
    }

    #[test]
    fn flag_values_only_true_enables() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("true").unwrap());
        assert!(!parse_flag("1").unwrap());
        assert!(!parse_flag("yes").unwrap());
        assert!(!parse_flag("").unwrap());
    }

    #[test]
    fn rejects_non_numeric_interval() {
        let argv = ["vault-init", "--interval-secs", "soon"];
        assert!(Config::try_parse_from(argv).is_err());
    }
}
