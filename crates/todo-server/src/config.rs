// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server configuration loaded from environment variables.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use todo_core::{Config, ConfigError};

/// Env file read in development when `ENV_PATH` is not set.
pub const DEFAULT_ENV_FILE: &str = ".env.development";

/// Identity reported by the root and health endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service name (`K_SERVICE`, or `local`).
    pub service: String,
    /// Deployed revision (`K_REVISION`), if any.
    pub revision: Option<String>,
    /// Environment name.
    pub env: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "local".to_string(),
            revision: None,
            env: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, always `0.0.0.0:<PORT>`.
    pub bind_addr: SocketAddr,
    /// Identity for health reporting.
    pub info: ServiceInfo,
    /// Origins allowed by CORS. Empty allows every origin.
    pub cors_allowed_origins: Vec<String>,
    /// Store, retry and pagination configuration.
    pub core: Config,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `PORT` (8080)
    /// - `K_SERVICE`, `K_REVISION`: Cloud Run identity
    /// - `TODO_ENV`: environment name (`production` on Cloud Run, else `development`)
    /// - `CORS_ALLOWED_ORIGINS`: comma separated origin list
    ///
    /// Store settings are read by [`Config::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env_non_blank("PORT") {
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or(ConfigError::Invalid("PORT", "must be a port number"))?,
            None => 8080,
        };

        let service = env_non_blank("K_SERVICE");
        let env = env_non_blank("TODO_ENV").unwrap_or_else(|| {
            if service.is_some() {
                "production".to_string()
            } else {
                "development".to_string()
            }
        });
        let info = ServiceInfo {
            service: service.unwrap_or_else(|| "local".to_string()),
            revision: env_non_blank("K_REVISION"),
            env,
        };

        Ok(Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            info,
            cors_allowed_origins: parse_origins(
                &std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default(),
            ),
            core: Config::from_env()?,
        })
    }
}

/// Load the development env file.
///
/// Skipped on Cloud Run (`K_SERVICE` set). Otherwise reads `ENV_PATH`, or
/// [`DEFAULT_ENV_FILE`]. Returns the path that was loaded, if any.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    if env_non_blank("K_SERVICE").is_some() {
        return Ok(None);
    }
    let path = env_non_blank("ENV_PATH").unwrap_or_else(|| DEFAULT_ENV_FILE.to_string());
    dotenvy::from_filename(path).map(Some)
}

/// Split a comma separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_non_blank(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
