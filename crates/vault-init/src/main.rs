//! `vault-init` entry point.
//!
//! Parses configuration, picks key storage (a Kubernetes secret when running
//! in a cluster, memory otherwise), then runs the lifecycle controller until
//! SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use vault_init::config::Config;
use vault_init_core::{Controller, VaultClient};
use vault_init_storage::{KubernetesKeyStorage, or_ephemeral};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .json()
        .init();

    info!(
        vault_addr = %config.vault_addr,
        namespace = %config.namespace,
        secret_name = %config.secret_name,
        "vault-init starting"
    );

    let vault = VaultClient::new(config.vault_client_config())
        .context("failed to build vault client")?;

    let storage = or_ephemeral(
        KubernetesKeyStorage::in_cluster(&config.secret_name, &config.namespace).await,
        config.debug,
    )
    .with_context(|| {
        format!(
            "failed to set up key storage in secret {}/{}",
            config.namespace, config.secret_name
        )
    })?;

    let controller = Controller::new(
        Arc::new(vault),
        Arc::from(storage),
        config.controller_settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));

    controller.run(shutdown_rx).await;

    info!("vault-init stopped");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping controller");
    let _ = shutdown_tx.send(true);
}
