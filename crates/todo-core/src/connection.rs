// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store connection lifecycle.
//!
//! [`ConnectionManager`] owns the single process-wide store connection. It
//! connects in the background with capped exponential backoff, publishes
//! connectivity through a `watch` channel, pings the store while connected
//! and falls back to the retry loop when the store goes away.
//!
//! ```text
//!            connect fails: sleep min(base * 2^attempt, max)
//!              ┌───────────────┐
//!              ▼               │
//!        ┌────────────┐        │        ┌───────────┐
//!  start │ CONNECTING │────────┘   ok   │ CONNECTED │──┐ ping every
//!  ─────►│            │───────────────►│           │◄─┘ heartbeat
//!        └────────────┘                 └─────┬─────┘
//!              ▲        ping fails (attempt=0) │
//!              └───────────────────────────────┘
//!
//!  close(): cancel the task from any state, then close the handle
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::persistence::{Persistence, PostgresPersistence, SqlitePersistence};

/// Shared handle to a connected store.
pub type ConnectionHandle = Arc<dyn Persistence>;

/// Options applied when opening a store connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound for reaching the store (initial connect, pool acquire).
    pub server_selection_timeout: Duration,
    /// Upper bound for a single store operation.
    pub socket_timeout: Duration,
    /// Maximum pooled connections.
    pub max_pool_size: u32,
    /// Liveness ping interval while connected.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            server_selection_timeout: Duration::from_secs(10),
            socket_timeout: Duration::from_secs(45),
            max_pool_size: 10,
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// Backoff schedule for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts already failed
    /// (0-based): `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Connection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// The URI is blank, malformed, or names an unsupported backend.
    #[error("Invalid store URI: {0}")]
    InvalidUri(String),

    /// The store could not be reached within the server-selection timeout.
    #[error("Timed out after {0:?} waiting for the store")]
    Timeout(Duration),

    /// The driver failed to open a connection.
    #[error("Failed to connect to store: {0}")]
    Connect(String),

    /// Schema migrations failed after connecting.
    #[error("Failed to apply migrations: {0}")]
    Migration(String),
}

impl ConnectionError {
    /// Whether another attempt could succeed without a configuration change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUri(_))
    }
}

/// Opens store handles for a URI.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a new handle for `uri`.
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectionHandle, ConnectionError>;
}

/// Store backend inferred from a URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `postgres://` or `postgresql://`
    Postgres,
    /// `sqlite:`
    Sqlite,
}

impl Backend {
    /// Infer the backend from `uri`.
    pub fn from_uri(uri: &str) -> Result<Self, ConnectionError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ConnectionError::InvalidUri("store URI is blank".to_string()));
        }
        if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if uri.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            let scheme = uri.split(':').next().unwrap_or_default();
            Err(ConnectionError::InvalidUri(format!(
                "unsupported scheme '{}'",
                scheme
            )))
        }
    }
}

/// Default connector backed by sqlx pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlxConnector;

#[async_trait::async_trait]
impl Connector for SqlxConnector {
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let handle: ConnectionHandle = match Backend::from_uri(uri)? {
            Backend::Postgres => Arc::new(PostgresPersistence::connect(uri, options).await?),
            Backend::Sqlite => Arc::new(SqlitePersistence::connect(uri, options).await?),
        };
        Ok(handle)
    }
}

/// Owns the store connection and its retry task.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    options: ConnectOptions,
    retry: RetryPolicy,
    state: watch::Sender<Option<ConnectionHandle>>,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager. Nothing is connected until [`connect`](Self::connect)
    /// or [`connect_with_retry`](Self::connect_with_retry) is called.
    pub fn new(connector: Arc<dyn Connector>, options: ConnectOptions, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            connector,
            options,
            retry,
            state,
            shutdown: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Create a manager using [`SqlxConnector`].
    pub fn with_defaults(options: ConnectOptions, retry: RetryPolicy) -> Self {
        Self::new(Arc::new(SqlxConnector), options, retry)
    }

    /// Create a manager that is already connected to `handle`.
    pub fn connected(handle: ConnectionHandle) -> Self {
        let manager = Self::with_defaults(ConnectOptions::default(), RetryPolicy::default());
        manager.state.send_replace(Some(handle));
        manager
    }

    /// The options used for new connections.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// The backoff schedule.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Current connectivity snapshot.
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The current handle, if connected.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.state.borrow().clone()
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionHandle>> {
        self.state.subscribe()
    }

    /// Wait until a connection is published.
    pub async fn wait_until_connected(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = rx.wait_for(|handle| handle.is_some()).await;
    }

    /// Make a single connection attempt and publish the handle on success.
    pub async fn connect(&self, uri: &str) -> Result<ConnectionHandle, ConnectionError> {
        let handle = attempt_connect(self.connector.as_ref(), uri, &self.options).await?;
        if self.closed.load(Ordering::SeqCst) {
            handle.close().await;
            return Err(ConnectionError::Connect("connection manager is closed".to_string()));
        }
        if let Some(previous) = self.state.send_replace(Some(handle.clone())) {
            previous.close().await;
        }
        Ok(handle)
    }

    /// Start connecting in the background.
    ///
    /// Returns immediately. Failures are retried without limit using the
    /// configured [`RetryPolicy`]. A blank or unsupported URI is rejected
    /// here instead of being retried forever.
    pub fn connect_with_retry(self: &Arc<Self>, uri: &str) -> Result<(), ConnectionError> {
        Backend::from_uri(uri)?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect("connection manager is closed".to_string()));
        }

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Connection task already running");
            return Ok(());
        }

        let manager = Arc::clone(self);
        let uri = uri.to_string();
        *task = Some(tokio::spawn(async move {
            manager.run(uri).await;
        }));

        Ok(())
    }

    /// Stop the retry task and close the connection if open.
    ///
    /// Safe to call repeatedly and when never connected.
    pub async fn close(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.shutdown.notify_one();

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!("Connection task panicked: {}", e);
        }

        if let Some(handle) = self.state.send_replace(None) {
            handle.close().await;
            info!("Store connection closed");
        } else if first {
            debug!("Connection manager closed without an open connection");
        }
    }

    /// Connection loop: connect with backoff, then monitor until the store
    /// drops or shutdown is requested.
    async fn run(self: Arc<Self>, uri: String) {
        info!(
            base_delay_ms = self.retry.base_delay.as_millis() as u64,
            max_delay_ms = self.retry.max_delay.as_millis() as u64,
            "Store connection task started"
        );

        loop {
            let Some(handle) = self.connect_loop(&uri).await else {
                break;
            };

            if !self.monitor(handle).await {
                break;
            }
        }

        debug!("Store connection task stopped");
    }

    /// Retry until connected. Returns `None` on shutdown.
    async fn connect_loop(&self, uri: &str) -> Option<ConnectionHandle> {
        let mut attempt: u32 = 0;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            let result = tokio::select! {
                _ = self.shutdown.notified() => return None,
                result = attempt_connect(self.connector.as_ref(), uri, &self.options) => result,
            };

            match result {
                Ok(handle) => {
                    if self.closed.load(Ordering::SeqCst) {
                        handle.close().await;
                        return None;
                    }
                    self.state.send_replace(Some(handle.clone()));
                    info!(attempts = attempt + 1, "Store connected");
                    return Some(handle);
                }
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "Store connection failed permanently");
                    return None;
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(
                        error = %e,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "Store connection failed, retrying"
                    );

                    tokio::select! {
                        _ = self.shutdown.notified() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Ping the store until it fails. Returns `false` on shutdown and
    /// `true` when the caller should reconnect.
    async fn monitor(&self, handle: ConnectionHandle) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return false,
                _ = tokio::time::sleep(self.options.heartbeat_interval) => {}
            }

            if let Err(e) = handle.ping().await {
                if self.closed.load(Ordering::SeqCst) {
                    return false;
                }
                warn!(error = %e, "Store heartbeat failed, reconnecting");
                self.state.send_replace(None);
                handle.close().await;
                return true;
            }
        }
    }
}

/// One connect attempt bounded by the server-selection timeout.
async fn attempt_connect(
    connector: &dyn Connector,
    uri: &str,
    options: &ConnectOptions,
) -> Result<ConnectionHandle, ConnectionError> {
    Backend::from_uri(uri)?;
    match tokio::time::timeout(
        options.server_selection_timeout,
        connector.connect(uri, options),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(options.server_selection_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TodoError;
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    /// Connector that fails a fixed number of times, then hands out an
    /// in-memory SQLite handle. Records when each attempt happened.
    struct FlakyConnector {
        failures: u32,
        calls: AtomicU32,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FlakyConnector {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Connector for FlakyConnector {
        async fn connect(
            &self,
            _uri: &str,
            _options: &ConnectOptions,
        ) -> Result<ConnectionHandle, ConnectionError> {
            self.attempts.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ConnectionError::Connect("connection refused".to_string()));
            }
            Ok(Arc::new(SqlitePersistence::in_memory().await?))
        }
    }

    #[test]
    fn test_delay_sequence_is_capped_exponential() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..8).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_delay_saturates_for_large_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(31), Duration::from_secs(30));
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backend_from_uri() {
        assert_eq!(
            Backend::from_uri("postgres://localhost/todos").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            Backend::from_uri("postgresql://u:p@db/todos").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            Backend::from_uri("sqlite::memory:").unwrap(),
            Backend::Sqlite
        );
        assert!(matches!(
            Backend::from_uri("   "),
            Err(ConnectionError::InvalidUri(_))
        ));
        assert!(matches!(
            Backend::from_uri("mongodb://localhost:27017/sampledb"),
            Err(ConnectionError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_error_retryability() {
        assert!(!ConnectionError::InvalidUri("x".to_string()).is_retryable());
        assert!(ConnectionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ConnectionError::Connect("x".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_blank_uri_fails_fast() {
        let manager = Arc::new(ConnectionManager::with_defaults(
            ConnectOptions::default(),
            RetryPolicy::default(),
        ));

        let err = manager.connect_with_retry("").unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidUri(_)));
        assert!(!manager.is_connected());

        let err = manager.connect("").await.err().unwrap();
        assert!(matches!(err, ConnectionError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn test_connect_publishes_handle() {
        let manager = ConnectionManager::with_defaults(
            ConnectOptions::default(),
            RetryPolicy::default(),
        );
        assert!(!manager.is_connected());

        manager.connect("sqlite::memory:").await.unwrap();
        assert!(manager.is_connected());
        manager.handle().unwrap().ping().await.unwrap();

        manager.close().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_attempts_follow_backoff_schedule() {
        // Never succeeds, so no real I/O happens under the paused clock.
        let connector = Arc::new(FlakyConnector::new(u32::MAX));
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectOptions::default(),
            RetryPolicy::default(),
        ));

        manager.connect_with_retry("sqlite::memory:").unwrap();

        // 1 + 2 + 4 + 8 + 16 + 30 + 30 = 91s covers eight attempts.
        tokio::time::sleep(Duration::from_secs(92)).await;
        assert!(!manager.is_connected());

        let times = connector.attempt_times();
        assert!(times.len() >= 8, "expected 8 attempts, got {}", times.len());
        let gaps: Vec<u64> = times
            .windows(2)
            .take(7)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8, 16, 30, 30]);

        manager.close().await;
    }

    #[tokio::test]
    async fn test_retry_eventually_connects() {
        let connector = Arc::new(FlakyConnector::new(3));
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectOptions::default(),
            RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
            },
        ));

        manager.connect_with_retry("sqlite::memory:").unwrap();
        assert!(!manager.is_connected());

        tokio::time::timeout(Duration::from_secs(5), manager.wait_until_connected())
            .await
            .expect("manager should connect after retries");

        assert!(manager.is_connected());
        let times = connector.attempt_times();
        assert_eq!(times.len(), 4);
        assert!(times[1] - times[0] >= Duration::from_millis(10));
        assert!(times[2] - times[1] >= Duration::from_millis(20));
        assert!(times[3] - times[2] >= Duration::from_millis(40));

        manager.close().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_heartbeat_failure_triggers_reconnect() {
        let connector = Arc::new(FlakyConnector::new(0));
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectOptions {
                heartbeat_interval: Duration::from_millis(20),
                ..Default::default()
            },
            RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
            },
        ));

        manager.connect_with_retry("sqlite::memory:").unwrap();
        manager.wait_until_connected().await;
        let first = manager.handle().unwrap();

        // Simulate the store dropping away underneath the pool.
        first.close().await;
        assert!(matches!(
            first.ping().await,
            Err(TodoError::StoreUnavailable)
        ));

        let mut rx = manager.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|h| h.as_ref().is_some_and(|h| !Arc::ptr_eq(h, &first))),
        )
        .await
        .expect("manager should reconnect")
        .unwrap();

        assert!(connector.attempt_times().len() >= 2);
        manager.handle().unwrap().ping().await.unwrap();

        manager.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_safe_when_never_connected() {
        let manager = Arc::new(ConnectionManager::with_defaults(
            ConnectOptions::default(),
            RetryPolicy::default(),
        ));

        manager.close().await;
        manager.close().await;
        assert!(!manager.is_connected());

        // Closed managers refuse to start again.
        assert!(manager.connect_with_retry("sqlite::memory:").is_err());
    }

    #[tokio::test]
    async fn test_close_cancels_pending_retry() {
        let connector = Arc::new(FlakyConnector::new(u32::MAX));
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectOptions::default(),
            RetryPolicy {
                base_delay: Duration::from_secs(3600),
                max_delay: Duration::from_secs(3600),
            },
        ));

        manager.connect_with_retry("sqlite::memory:").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The task is parked in an hour-long sleep; close must not wait for it.
        tokio::time::timeout(Duration::from_secs(1), manager.close())
            .await
            .expect("close should cancel the retry sleep");

        assert_eq!(connector.attempt_times().len(), 1);
        assert!(!manager.is_connected());
    }

    /// Connector whose attempts never complete.
    struct HangingConnector {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Connector for HangingConnector {
        async fn connect(
            &self,
            _uri: &str,
            _options: &ConnectOptions,
        ) -> Result<ConnectionHandle, ConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_connect_attempt() {
        let connector = Arc::new(HangingConnector {
            calls: AtomicU32::new(0),
        });
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectOptions::default(),
            RetryPolicy::default(),
        ));

        manager.connect_with_retry("postgres://unreachable.invalid/todos").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);

        // Well under the 10s server-selection timeout the attempt is bounded by.
        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(1), manager.close())
            .await
            .expect("close should cancel the connect attempt");
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(!manager.is_connected());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }
}
