// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backend implementations for todo records.
//!
//! The [`Persistence`] trait is the seam between the record store and the
//! database. Two sqlx backends implement it:
//!
//! | Backend | URI scheme | Use |
//! |---------|------------|-----|
//! | [`PostgresPersistence`] | `postgres://`, `postgresql://` | production |
//! | [`SqlitePersistence`] | `sqlite:` | local development, tests |

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use chrono::{DateTime, Utc};

use crate::error::TodoError;
use crate::model::{ListFilter, Todo, TodoChanges};

/// Storage operations for todo records.
///
/// Implementations translate driver failures into
/// [`TodoError::StoreOperation`]; they never perform validation.
#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    /// Round-trip to the store to verify the connection is alive.
    async fn ping(&self) -> Result<(), TodoError>;

    /// Close the underlying pool. Must be safe to call more than once.
    async fn close(&self);

    /// Insert a fully formed record.
    async fn insert_todo(&self, todo: &Todo) -> Result<(), TodoError>;

    /// Fetch a record by id.
    async fn get_todo(&self, id: &str) -> Result<Option<Todo>, TodoError>;

    /// Fetch a window of matching records, newest first.
    ///
    /// Ordering is `created_at DESC, id DESC`.
    async fn list_todos(
        &self,
        filter: &ListFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Todo>, TodoError>;

    /// Count all records matching the filter.
    async fn count_todos(&self, filter: &ListFilter) -> Result<i64, TodoError>;

    /// Apply the given changes and refresh `updated_at`.
    ///
    /// Returns `None` when no record has the id.
    async fn update_todo(
        &self,
        id: &str,
        changes: &TodoChanges,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Todo>, TodoError>;

    /// Remove a record. Returns whether a row was deleted.
    async fn delete_todo(&self, id: &str) -> Result<bool, TodoError>;
}
