// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::connection::{ConnectOptions, RetryPolicy};
use crate::service::PaginationConfig;

/// Store URI used in development when none is configured.
pub const DEV_DATABASE_URL: &str = "sqlite:.data/todos.db?mode=rwc";

/// Store, retry and pagination configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Pool and timeout options for the store connection
    pub connect: ConnectOptions,
    /// Reconnect backoff schedule
    pub retry: RetryPolicy,
    /// List paging limits
    pub pagination: PaginationConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required in production (`K_SERVICE` set or `TODO_ENV=production`):
    /// - `TODO_DATABASE_URL` (or `DATABASE_URL`)
    ///
    /// Optional (with defaults):
    /// - `TODO_DB_SERVER_SELECTION_TIMEOUT_MS` (10000)
    /// - `TODO_DB_SOCKET_TIMEOUT_MS` (45000)
    /// - `TODO_DB_POOL_SIZE` (10)
    /// - `TODO_DB_HEARTBEAT_MS` (10000)
    /// - `TODO_RETRY_BASE_MS` (1000), `TODO_RETRY_MAX_MS` (30000)
    /// - `TODO_PAGE_DEFAULT_LIMIT` (20), `TODO_PAGE_MAX_LIMIT` (100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = match env_non_blank("TODO_DATABASE_URL")
            .or_else(|| env_non_blank("DATABASE_URL"))
        {
            Some(url) => url,
            None if is_production() => return Err(ConfigError::Missing("TODO_DATABASE_URL")),
            None => DEV_DATABASE_URL.to_string(),
        };

        let connect = ConnectOptions {
            server_selection_timeout: env_millis(
                "TODO_DB_SERVER_SELECTION_TIMEOUT_MS",
                10_000,
            )?,
            socket_timeout: env_millis("TODO_DB_SOCKET_TIMEOUT_MS", 45_000)?,
            max_pool_size: env_parse(
                "TODO_DB_POOL_SIZE",
                10,
                "must be a positive integer",
            )?,
            heartbeat_interval: env_millis("TODO_DB_HEARTBEAT_MS", 10_000)?,
        };
        if connect.max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "TODO_DB_POOL_SIZE",
                "must be a positive integer",
            ));
        }

        let retry = RetryPolicy {
            base_delay: env_millis("TODO_RETRY_BASE_MS", 1_000)?,
            max_delay: env_millis("TODO_RETRY_MAX_MS", 30_000)?,
        };
        if retry.max_delay < retry.base_delay {
            return Err(ConfigError::Invalid(
                "TODO_RETRY_MAX_MS",
                "must not be smaller than TODO_RETRY_BASE_MS",
            ));
        }

        let max_limit: u32 = env_parse(
            "TODO_PAGE_MAX_LIMIT",
            100,
            "must be a positive integer",
        )?;
        if max_limit == 0 {
            return Err(ConfigError::Invalid(
                "TODO_PAGE_MAX_LIMIT",
                "must be a positive integer",
            ));
        }
        let default_limit: u32 = env_parse(
            "TODO_PAGE_DEFAULT_LIMIT",
            20,
            "must be a positive integer",
        )?;

        Ok(Self {
            database_url,
            connect,
            retry,
            pagination: PaginationConfig {
                default_limit: default_limit.clamp(1, max_limit),
                max_limit,
            },
        })
    }
}

/// True on Cloud Run (`K_SERVICE` set) or when `TODO_ENV=production`.
pub fn is_production() -> bool {
    env_non_blank("K_SERVICE").is_some()
        || env_non_blank("TODO_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"))
}

fn env_non_blank(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(
    key: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match env_non_blank(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid(key, reason)),
        None => Ok(default),
    }
}

fn env_millis(key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = env_parse(key, default_ms, "must be a duration in milliseconds")?;
    if ms == 0 {
        return Err(ConfigError::Invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
