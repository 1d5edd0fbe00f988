// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::debug;

use crate::connection::{ConnectOptions, ConnectionError};
use crate::error::TodoError;
use crate::migrations;
use crate::model::{ListFilter, Todo, TodoChanges};

use super::Persistence;

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres persistence provider from an existing pool.
    ///
    /// The schema is expected to be in place; see [`crate::migrations`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `uri` and apply migrations.
    ///
    /// The socket timeout becomes the session `statement_timeout`, so a
    /// query that runs past it fails instead of hanging the request.
    pub async fn connect(uri: &str, options: &ConnectOptions) -> Result<Self, ConnectionError> {
        let connect_options = PgConnectOptions::from_str(uri)
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?
            .options([(
                "statement_timeout",
                options.socket_timeout.as_millis().to_string(),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_pool_size)
            .acquire_timeout(options.server_selection_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        if let Err(e) = migrations::run_postgres(&pool).await {
            pool.close().await;
            return Err(ConnectionError::Migration(e.to_string()));
        }

        debug!(max_connections = options.max_pool_size, "Postgres pool ready");

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn ping(&self) -> Result<(), TodoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), TodoError> {
        sqlx::query(
            r#"
            INSERT INTO todos (id, title, done, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&todo.id)
        .bind(&todo.title)
        .bind(todo.done)
        .bind(todo.created_at)
        .bind(todo.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_todo(&self, id: &str) -> Result<Option<Todo>, TodoError> {
        let record = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, title, done, created_at, updated_at
            FROM todos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_todos(
        &self,
        filter: &ListFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Todo>, TodoError> {
        let records = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, title, done, created_at, updated_at
            FROM todos
            WHERE ($1::text IS NULL OR strpos(lower(title), $1) > 0)
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(filter.needle())
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_todos(&self, filter: &ListFilter) -> Result<i64, TodoError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM todos
            WHERE ($1::text IS NULL OR strpos(lower(title), $1) > 0)
            "#,
        )
        .bind(filter.needle())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update_todo(
        &self,
        id: &str,
        changes: &TodoChanges,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Todo>, TodoError> {
        let record = sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos
            SET title = COALESCE($2, title),
                done = COALESCE($3, done),
                updated_at = $4
            WHERE id = $1
            RETURNING id, title, done, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref())
        .bind(changes.done)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_todo(&self, id: &str) -> Result<bool, TodoError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
