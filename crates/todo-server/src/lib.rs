// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo Server - HTTP API for the todo resource
//!
//! An axum server exposing [`todo_core::TodoService`] as JSON over HTTP.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Liveness `{ok, service}` |
//! | `GET` | `/health`, `/api/health` | Identity and store connectivity |
//! | `GET` | `/api/todos` | Paginated list, `?page=&limit=&q=` |
//! | `POST` | `/api/todos` | Create (201) |
//! | `GET` | `/api/todos/{id}` | Fetch one |
//! | `PATCH` | `/api/todos/{id}` | Partial update |
//! | `DELETE` | `/api/todos/{id}` | Delete (204) |
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | `8080` | Listen port on `0.0.0.0` |
//! | `K_SERVICE` | No | `local` | Service name; set on Cloud Run |
//! | `K_REVISION` | No | - | Revision reported by health |
//! | `TODO_ENV` | No | `development` | Environment name |
//! | `CORS_ALLOWED_ORIGINS` | No | - | Comma separated origins; empty allows all |
//! | `ENV_PATH` | No | `.env.development` | Env file loaded outside Cloud Run |
//!
//! Store settings are documented in [`todo_core`].
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`error`]: Error to HTTP response mapping
//! - [`handlers`]: Route handlers
//! - [`router`]: Route table, CORS, tracing and panic middleware
//! - [`runtime`]: Embeddable server with graceful shutdown

#![deny(missing_docs)]

/// Server configuration loaded from environment variables.
pub mod config;

/// Error to HTTP response mapping.
pub mod error;

/// Route handlers.
pub mod handlers;

/// Route table and middleware.
pub mod router;

/// Embeddable server runtime.
pub mod runtime;

pub use config::{ServerConfig, ServiceInfo};
pub use handlers::AppState;
pub use router::router;
pub use runtime::{RunningServer, TodoServer, TodoServerBuilder};
