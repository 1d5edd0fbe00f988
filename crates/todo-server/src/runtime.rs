// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the todo API server.
//!
//! [`TodoServer`] binds the HTTP listener first and connects to the store in
//! the background, so health checks answer while the store is still
//! unreachable.
//!
//! ```rust,ignore
//! use todo_server::runtime::TodoServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = TodoServer::builder()
//!         .database_url("postgres://localhost/todos")
//!         .bind_addr("0.0.0.0:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run until a shutdown signal ...
//!
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use todo_core::{
    ConnectOptions, ConnectionManager, Connector, PaginationConfig, RetryPolicy, SqlxConnector,
    TodoService,
};
use tracing::{error, info};

use crate::config::{ServerConfig, ServiceInfo};
use crate::handlers::AppState;
use crate::router::router;

/// Builder for a [`TodoServer`].
pub struct TodoServerBuilder {
    bind_addr: SocketAddr,
    database_url: Option<String>,
    connector: Arc<dyn Connector>,
    connect_options: ConnectOptions,
    retry: RetryPolicy,
    pagination: PaginationConfig,
    info: ServiceInfo,
    cors_allowed_origins: Vec<String>,
}

impl Default for TodoServerBuilder {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            connector: Arc::new(SqlxConnector),
            connect_options: ConnectOptions::default(),
            retry: RetryPolicy::default(),
            pagination: PaginationConfig::default(),
            info: ServiceInfo::default(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl TodoServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP listen address.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the store URI (required).
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Replace the connector used to open store handles.
    ///
    /// Default: [`SqlxConnector`]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Set pool and timeout options for the store connection.
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    /// Set the reconnect backoff schedule.
    ///
    /// Default: 1s doubling up to 30s
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set list paging limits.
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Set the identity reported by health endpoints.
    pub fn service_info(mut self, info: ServiceInfo) -> Self {
        self.info = info;
        self
    }

    /// Restrict CORS to these origins. Empty allows every origin.
    pub fn cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }

    /// Apply everything from a loaded [`ServerConfig`].
    pub fn config(self, config: &ServerConfig) -> Self {
        self.bind_addr(config.bind_addr)
            .database_url(config.core.database_url.clone())
            .connect_options(config.core.connect.clone())
            .retry_policy(config.core.retry)
            .pagination(config.core.pagination)
            .service_info(config.info.clone())
            .cors_allowed_origins(config.cors_allowed_origins.clone())
    }

    /// Build the server.
    ///
    /// Returns an error if the store URI is missing.
    pub fn build(self) -> Result<TodoServer> {
        let database_url = self
            .database_url
            .ok_or_else(|| anyhow::anyhow!("database_url is required"))?;

        Ok(TodoServer {
            bind_addr: self.bind_addr,
            database_url,
            connector: self.connector,
            connect_options: self.connect_options,
            retry: self.retry,
            pagination: self.pagination,
            info: self.info,
            cors_allowed_origins: self.cors_allowed_origins,
        })
    }
}

/// A configured, not yet started server.
pub struct TodoServer {
    bind_addr: SocketAddr,
    database_url: String,
    connector: Arc<dyn Connector>,
    connect_options: ConnectOptions,
    retry: RetryPolicy,
    pagination: PaginationConfig,
    info: ServiceInfo,
    cors_allowed_origins: Vec<String>,
}

impl TodoServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> TodoServerBuilder {
        TodoServerBuilder::new()
    }

    /// Bind the listener, start serving, then start connecting to the store.
    ///
    /// Returns once the listener is bound. Store connection failures are
    /// retried in the background; only a malformed store URI fails here.
    pub async fn start(self) -> Result<RunningServer> {
        let connection = Arc::new(ConnectionManager::new(
            self.connector,
            self.connect_options,
            self.retry,
        ));
        let service = TodoService::new(connection.clone(), self.pagination);
        let app = router(AppState::new(service, self.info), &self.cors_allowed_origins);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind_addr))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
                .context("HTTP server failed")
        });

        info!(addr = %local_addr, "HTTP server listening");

        if let Err(e) = connection.connect_with_retry(&self.database_url) {
            let _ = shutdown_tx.send(true);
            if let Err(join_err) = server_handle.await {
                error!("HTTP server task panicked: {}", join_err);
            }
            return Err(e).context("Failed to start store connection");
        }

        Ok(RunningServer {
            local_addr,
            connection,
            shutdown_tx,
            server_handle: Mutex::new(Some(server_handle)),
        })
    }
}

/// A running server. Call [`shutdown`](Self::shutdown) for graceful
/// termination.
pub struct RunningServer {
    local_addr: SocketAddr,
    connection: Arc<ConnectionManager>,
    shutdown_tx: watch::Sender<bool>,
    server_handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl RunningServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The store connection manager.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Whether the HTTP server task is still running.
    pub fn is_running(&self) -> bool {
        self.server_handle
            .try_lock()
            .map(|handle| handle.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(true)
    }

    /// Gracefully shut down.
    ///
    /// Stops accepting connections, waits for in-flight requests, then
    /// closes the store connection. Later calls return `Ok(())` without
    /// doing anything.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.server_handle.lock().await;
        let Some(handle) = guard.take() else {
            return Ok(());
        };

        info!("Shutting down HTTP server...");
        let _ = self.shutdown_tx.send(true);

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("HTTP server task panicked: {}", e)),
        };
        if let Err(e) = &result {
            error!("HTTP server error during shutdown: {:#}", e);
        }

        self.connection.close().await;
        info!("Shutdown complete");

        result
    }
}
