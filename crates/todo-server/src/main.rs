// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo Server - HTTP API for the todo resource

use tracing::{debug, info, warn};

use todo_server::config::{self, ServerConfig};
use todo_server::runtime::TodoServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_server=info,todo_core=info,tower_http=info".into()),
        )
        .init();

    // Load env file outside Cloud Run
    match config::load_env_file() {
        Ok(Some(path)) => info!(path = %path.display(), "Loaded env file"),
        Ok(None) => debug!("Running on Cloud Run, env file skipped"),
        Err(e) => warn!("No env file loaded: {}", e),
    }

    let config = ServerConfig::from_env()?;

    info!(
        addr = %config.bind_addr,
        service = %config.info.service,
        env = %config.info.env,
        "Starting todo server"
    );

    let server = TodoServer::builder()
        .config(&config)
        .build()?
        .start()
        .await?;

    shutdown_signal().await;
    info!("Shutdown signal received");

    server.shutdown().await?;

    info!("Todo server shut down");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
