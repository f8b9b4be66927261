// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pg_admission::config::Config;
use pg_admission::constants::OPERATOR_NAME;
use pg_admission::orchestrator::{Context, Orchestrator};
use pg_admission::server::WebhookServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting {}", OPERATOR_NAME);

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: namespace={}, selector={}, api_services={:?}",
        config.namespace, config.label_selector, config.api_services
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let orchestrator = Orchestrator::new(Arc::new(Context { client, config }));
    let cancel = CancellationToken::new();

    // Ctrl-C during startup aborts setup as well as the running server
    let signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    let setup = orchestrator.setup(WebhookServer::new(), &cancel).await;
    let (server, setup_error) = match setup {
        Ok(handle) => (Some(handle), None),
        Err(e) => {
            error!("Setup failed: {}", e);
            (None, Some(e))
        }
    };

    if let Some(handle) = server {
        let (versions, driver) = orchestrator.version_catalog();
        tokio::spawn(driver);
        tokio::select! {
            ready = versions.wait_until_ready() => {
                if ready {
                    let supported = versions.list().iter().filter(|v| !v.is_deprecated()).count();
                    info!("{} supported Postgres versions in catalog", supported);
                }
            }
            _ = cancel.cancelled() => {}
        }

        cancel.cancelled().await;
        if let Err(e) = handle.shutdown().await {
            warn!("Webhook server exited with error: {}", e);
        }
    }

    // Teardown gets its own token: the process token is already cancelled here
    let report = orchestrator.teardown(&CancellationToken::new()).await;
    for entry in &report.entries {
        info!("Teardown {}: {:?}", entry.target, entry.outcome);
    }
    if !report.is_clean() {
        warn!("{} teardown target(s) failed", report.failures().count());
    }

    info!("{} stopped", OPERATOR_NAME);
    match setup_error {
        Some(e) => Err(e).context("Setup failed"),
        None => Ok(()),
    }
}
