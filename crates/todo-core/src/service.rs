// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo resource service.
//!
//! Validation and orchestration between a transport and the
//! [`TodoStore`]. Request bodies arrive as loosely typed JSON; each
//! operation has its own request type and the rules below decide what is
//! accepted:
//!
//! | Operation | Input | Rules |
//! |-----------|-------|-------|
//! | `create` | [`CreateTodoRequest`] | `title` required, string, non-blank; `done` coerced to bool |
//! | `list` | [`ListTodosQuery`] | `page` clamped to >= 1, `limit` to `[1, max_limit]` |
//! | `patch` | [`PatchTodoRequest`] | present `title` must be a non-blank string; present `done` coerced |
//!
//! Title search ignores case. On the SQLite backend only ASCII letters are
//! folded, so non-ASCII letters must match in case.
//!
//! Every operation also fails with [`TodoError::StoreUnavailable`] when the
//! connection manager reports no connection, after input validation.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::connection::ConnectionManager;
use crate::error::{Result, TodoError};
use crate::model::{ListFilter, Todo, TodoChanges, TodoPage};
use crate::store::TodoStore;

/// Message for a missing or invalid title on create.
pub const TITLE_REQUIRED: &str = "title is required (string)";

/// Message for an invalid title on patch.
pub const TITLE_MUST_BE_STRING: &str = "title must be string";

/// List paging limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Page size when the caller gives none.
    pub default_limit: u32,
    /// Largest page size a caller may request.
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTodoRequest {
    /// Raw title value.
    #[serde(default)]
    pub title: Option<Value>,
    /// Raw done value, coerced by truthiness.
    #[serde(default)]
    pub done: Option<Value>,
}

/// Body of a patch request.
///
/// `None` means the field was absent; `Some(Value::Null)` means it was sent
/// as an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchTodoRequest {
    /// Raw title value, if present.
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    /// Raw done value, if present.
    #[serde(default, deserialize_with = "present")]
    pub done: Option<Value>,
}

/// Query string of a list request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTodosQuery {
    /// 1-based page number.
    pub page: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// Case-insensitive title search.
    pub q: Option<String>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// The todo resource service.
#[derive(Clone)]
pub struct TodoService {
    connection: Arc<ConnectionManager>,
    store: TodoStore,
    pagination: PaginationConfig,
}

impl TodoService {
    /// Create a service over `connection`.
    pub fn new(connection: Arc<ConnectionManager>, pagination: PaginationConfig) -> Self {
        let store = TodoStore::new(connection.clone());
        Self {
            connection,
            store,
            pagination,
        }
    }

    /// The connection manager backing this service.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Paging limits in effect.
    pub fn pagination(&self) -> PaginationConfig {
        self.pagination
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            debug!("Rejecting request: store not connected");
            Err(TodoError::StoreUnavailable)
        }
    }

    /// Create a todo.
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: CreateTodoRequest) -> Result<Todo> {
        let title = match input.title {
            Some(Value::String(title)) if !title.trim().is_empty() => title,
            _ => return Err(TodoError::validation(TITLE_REQUIRED)),
        };
        let done = input.done.as_ref().is_some_and(truthy);

        self.ensure_connected()?;
        self.store.insert(&title, done).await
    }

    /// List todos, silently clamping out-of-range paging input.
    #[instrument(skip(self, query))]
    pub async fn list(&self, query: ListTodosQuery) -> Result<TodoPage> {
        let page = clamp_u32(query.page.as_deref().and_then(parse_int_prefix), 1, 1, u32::MAX);
        let limit = clamp_u32(
            query.limit.as_deref().and_then(parse_int_prefix),
            i64::from(self.pagination.default_limit),
            1,
            self.pagination.max_limit,
        );
        let filter = ListFilter::from_query(query.q.as_deref());

        self.ensure_connected()?;
        self.store.list(&filter, page, limit).await
    }

    /// Fetch one todo.
    #[instrument(skip(self))]
    pub async fn get_one(&self, id: &str) -> Result<Todo> {
        self.ensure_connected()?;
        self.store.get_by_id(id).await
    }

    /// Partially update a todo.
    #[instrument(skip(self, input))]
    pub async fn patch(&self, id: &str, input: PatchTodoRequest) -> Result<Todo> {
        let title = match input.title {
            None => None,
            Some(Value::String(title)) if !title.trim().is_empty() => {
                Some(title.trim().to_string())
            }
            Some(_) => return Err(TodoError::validation(TITLE_MUST_BE_STRING)),
        };
        let done = input.done.as_ref().map(truthy);

        self.ensure_connected()?;
        self.store
            .update_by_id(id, TodoChanges { title, done })
            .await
    }

    /// Delete a todo.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.store.delete_by_id(id).await
    }
}

/// JavaScript-style truthiness of a JSON value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse a leading integer the way `parseInt(s, 10)` does: optional
/// whitespace and sign, then digits; anything after the digits is ignored.
///
/// Returns `None` when no digits lead the string.
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        seen = true;
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    seen.then_some(if negative { -value } else { value })
}

fn clamp_u32(value: Option<i64>, default: i64, min: u32, max: u32) -> u32 {
    value
        .unwrap_or(default)
        .clamp(i64::from(min), i64::from(max)) as u32
}
