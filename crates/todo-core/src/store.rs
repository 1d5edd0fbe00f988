// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo record store.
//!
//! Typed CRUD over whatever handle the [`ConnectionManager`] currently
//! holds. Every call fails immediately with [`TodoError::StoreUnavailable`]
//! when no connection is published; nothing here retries.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::error::{Result, TodoError};
use crate::model::{ListFilter, Todo, TodoChanges, TodoPage};

/// Record store for todos.
#[derive(Clone)]
pub struct TodoStore {
    connection: Arc<ConnectionManager>,
}

impl TodoStore {
    /// Create a store reading its handle from `connection`.
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    fn handle(&self) -> Result<ConnectionHandle> {
        self.connection.handle().ok_or(TodoError::StoreUnavailable)
    }

    /// Insert a todo, assigning its id and timestamps.
    ///
    /// `created_at` and `updated_at` are identical on the returned record.
    pub async fn insert(&self, title: &str, done: bool) -> Result<Todo> {
        let title = normalize_title(title)?;
        let handle = self.handle()?;

        let now = now();
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            title,
            done,
            created_at: now,
            updated_at: now,
        };

        handle.insert_todo(&todo).await?;
        debug!(id = %todo.id, "Inserted todo");

        Ok(todo)
    }

    /// One page of matching todos, newest first, plus the total match count.
    ///
    /// `page` is 1-based; `limit` must be at least 1.
    pub async fn list(&self, filter: &ListFilter, page: u32, limit: u32) -> Result<TodoPage> {
        if page == 0 {
            return Err(TodoError::validation("page must be at least 1"));
        }
        if limit == 0 {
            return Err(TodoError::validation("limit must be at least 1"));
        }
        let handle = self.handle()?;

        let offset = (i64::from(page) - 1) * i64::from(limit);
        let (items, total) = tokio::try_join!(
            handle.list_todos(filter, offset, i64::from(limit)),
            handle.count_todos(filter),
        )?;

        Ok(TodoPage {
            items,
            page,
            limit,
            total: total.max(0) as u64,
        })
    }

    /// Fetch a todo by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Todo> {
        let handle = self.handle()?;
        handle
            .get_todo(id)
            .await?
            .ok_or_else(|| TodoError::not_found(id))
    }

    /// Apply a partial update and refresh `updated_at`.
    ///
    /// A provided title must be non-empty after trimming; this is checked
    /// before the store is touched.
    pub async fn update_by_id(&self, id: &str, changes: TodoChanges) -> Result<Todo> {
        let changes = TodoChanges {
            title: changes.title.as_deref().map(normalize_title).transpose()?,
            done: changes.done,
        };
        let handle = self.handle()?;

        let updated = handle
            .update_todo(id, &changes, now())
            .await?
            .ok_or_else(|| TodoError::not_found(id))?;
        debug!(id = %updated.id, "Updated todo");

        Ok(updated)
    }

    /// Delete a todo permanently.
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        let handle = self.handle()?;
        if handle.delete_todo(id).await? {
            debug!(id, "Deleted todo");
            Ok(())
        } else {
            Err(TodoError::not_found(id))
        }
    }
}

/// Trim a title and reject it when nothing is left.
pub fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TodoError::validation("title must be a non-empty string"));
    }
    Ok(trimmed.to_string())
}

/// Store timestamps use microsecond precision, which both backends keep
/// exactly.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
