// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo Core - Store Connection, Records and Resource Service
//!
//! This crate holds everything below the HTTP surface of the todo API: the
//! store connection lifecycle, typed CRUD over todo records, and the
//! validating resource service that transports call into.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            Transport (todo-server)            │
//! └───────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │  TodoService   validation, paging, coercion   │
//! └───────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │  TodoStore     ids, timestamps, not-found     │
//! └───────────────────────────────────────────────┘
//!                         │ current handle
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │  ConnectionManager   backoff, heartbeat       │
//! └───────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌──────────────────────┐ ┌──────────────────────┐
//! │ PostgresPersistence  │ │ SqlitePersistence    │
//! └──────────────────────┘ └──────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `create` | Validate a title, insert with a fresh id and timestamps |
//! | `list` | Page of todos newest first, optional title search, total count |
//! | `get_one` | Fetch by id |
//! | `patch` | Partial update of title and/or done, refreshes `updatedAt` |
//! | `remove` | Permanent delete |
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TODO_DATABASE_URL` | Prod only | `sqlite:.data/todos.db?mode=rwc` | Store URI |
//! | `DATABASE_URL` | No | - | Fallback if above not set |
//! | `TODO_DB_SERVER_SELECTION_TIMEOUT_MS` | No | `10000` | Connect and acquire timeout |
//! | `TODO_DB_SOCKET_TIMEOUT_MS` | No | `45000` | Per-operation timeout |
//! | `TODO_DB_POOL_SIZE` | No | `10` | Max pooled connections |
//! | `TODO_DB_HEARTBEAT_MS` | No | `10000` | Liveness ping interval |
//! | `TODO_RETRY_BASE_MS` | No | `1000` | First reconnect delay |
//! | `TODO_RETRY_MAX_MS` | No | `30000` | Reconnect delay cap |
//! | `TODO_PAGE_DEFAULT_LIMIT` | No | `20` | List page size |
//! | `TODO_PAGE_MAX_LIMIT` | No | `100` | Largest allowed page size |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`connection`]: Store connection manager with retry and heartbeat
//! - [`error`]: Error taxonomy shared by store and service
//! - [`migrations`]: Embedded schema migrations
//! - [`model`]: Todo record and query types
//! - [`persistence`]: Storage trait and sqlx backends
//! - [`service`]: Validating resource service
//! - [`store`]: Typed CRUD over the current connection

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Store connection lifecycle.
pub mod connection;

/// Error types for todo operations.
pub mod error;

/// Embedded schema migrations for PostgreSQL and SQLite.
pub mod migrations;

/// Todo record and query types.
pub mod model;

/// Storage trait and backend implementations.
pub mod persistence;

/// Validating resource service.
pub mod service;

/// Typed CRUD over the current store connection.
pub mod store;

pub use config::{Config, ConfigError};
pub use connection::{
    Backend, ConnectOptions, ConnectionError, ConnectionHandle, ConnectionManager, Connector,
    RetryPolicy, SqlxConnector,
};
pub use error::{Result, TodoError};
pub use model::{ListFilter, Todo, TodoChanges, TodoPage};
pub use persistence::{Persistence, PostgresPersistence, SqlitePersistence};
pub use service::{
    CreateTodoRequest, ListTodosQuery, PaginationConfig, PatchTodoRequest, TodoService,
};
pub use store::TodoStore;
