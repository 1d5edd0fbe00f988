// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo domain and wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A todo item.
///
/// Serialized as `{_id, title, done, createdAt, updatedAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Store-assigned identifier, immutable after insert.
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Trimmed, non-empty title.
    pub title: String,
    /// Completion flag.
    pub done: bool,
    /// When the record was inserted.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Fields to change in a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoChanges {
    /// New title, already trimmed and validated.
    pub title: Option<String>,
    /// New completion flag.
    pub done: Option<bool>,
}

impl TodoChanges {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.done.is_none()
    }
}

/// Title filter for list queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Case-insensitive substring the title must contain.
    pub q: Option<String>,
}

impl ListFilter {
    /// Build a filter from raw search text.
    ///
    /// Blank text (after trimming) matches everything.
    pub fn from_query(q: Option<&str>) -> Self {
        let q = q
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self { q }
    }

    /// Lowercased needle for backends whose `lower()` folds Unicode.
    pub fn needle(&self) -> Option<String> {
        self.q.as_ref().map(|q| q.to_lowercase())
    }

    /// Needle with only ASCII letters lowercased, matching SQLite's
    /// `lower()`. Non-ASCII letters must then match case exactly.
    pub fn ascii_needle(&self) -> Option<String> {
        self.q.as_ref().map(|q| q.to_ascii_lowercase())
    }
}

/// One page of todos plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPage {
    /// Matching todos, newest first.
    pub items: Vec<Todo>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Number of matching todos ignoring the page window.
    pub total: u64,
}
