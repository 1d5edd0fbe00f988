// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::connection::{ConnectOptions, ConnectionError};
use crate::error::TodoError;
use crate::migrations;
use crate::model::{ListFilter, Todo, TodoChanges};

use super::Persistence;

/// SQLite-backed persistence provider.
///
/// SQLite's `lower()` only folds ASCII, so title search ignores case for
/// ASCII letters only; non-ASCII letters match when their case matches.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `uri` and apply migrations.
    ///
    /// File databases get their parent directory created. In-memory
    /// databases are pinned to a single long-lived connection, since every
    /// new connection would otherwise see an empty database.
    pub async fn connect(uri: &str, options: &ConnectOptions) -> Result<Self, ConnectionError> {
        let connect_options = SqliteConnectOptions::from_str(uri)
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(options.socket_timeout);

        let in_memory = uri.contains(":memory:") || uri.contains("mode=memory");

        if !in_memory
            && let Some(parent) = connect_options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConnectionError::Connect(format!(
                    "Failed to create directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let pool_options = SqlitePoolOptions::new().acquire_timeout(options.server_selection_timeout);
        let pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_options.max_connections(options.max_pool_size)
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        if let Err(e) = migrations::run_sqlite(&pool).await {
            pool.close().await;
            return Err(ConnectionError::Migration(e.to_string()));
        }

        debug!(in_memory, "SQLite pool ready");

        Ok(Self { pool })
    }

    /// Open a fresh, migrated in-memory database.
    pub async fn in_memory() -> Result<Self, ConnectionError> {
        Self::connect("sqlite::memory:", &ConnectOptions::default()).await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
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
            VALUES (?, ?, ?, ?, ?)
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
            WHERE id = ?
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
            WHERE (?1 IS NULL OR instr(lower(title), ?1) > 0)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?2
            "#,
        )
        .bind(filter.ascii_needle())
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
            WHERE (?1 IS NULL OR instr(lower(title), ?1) > 0)
            "#,
        )
        .bind(filter.ascii_needle())
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
            SET title = COALESCE(?2, title),
                done = COALESCE(?3, done),
                updated_at = ?4
            WHERE id = ?1
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
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use uuid::Uuid;

    type Duration = chrono::Duration;

    /// Create an in-memory SQLite persistence for testing.
    async fn test_persistence() -> SqlitePersistence {
        SqlitePersistence::in_memory()
            .await
            .expect("Failed to create in-memory SQLite persistence")
    }

    fn record(title: &str, created_at: DateTime<Utc>) -> Todo {
        let created_at = created_at.trunc_subsecs(6);
        Todo {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            done: false,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_todo() {
        let persistence = test_persistence().await;
        let todo = record("Buy milk", Utc::now());

        persistence
            .insert_todo(&todo)
            .await
            .expect("Failed to insert todo");

        let fetched = persistence
            .get_todo(&todo.id)
            .await
            .expect("Failed to get todo")
            .expect("Todo should exist");

        assert_eq!(fetched, todo);
    }

    #[tokio::test]
    async fn test_get_todo_not_found() {
        let persistence = test_persistence().await;

        let result = persistence
            .get_todo("nonexistent")
            .await
            .expect("Query should succeed");

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_with_id_tiebreak() {
        let persistence = test_persistence().await;
        let base = Utc::now();

        let oldest = record("oldest", base - Duration::seconds(10));
        let newest = record("newest", base);
        let mut tie_a = record("tie a", base - Duration::seconds(5));
        let mut tie_b = record("tie b", base - Duration::seconds(5));
        tie_a.id = "aaaa".to_string();
        tie_b.id = "bbbb".to_string();

        for todo in [&oldest, &tie_a, &newest, &tie_b] {
            persistence.insert_todo(todo).await.unwrap();
        }

        let items = persistence
            .list_todos(&ListFilter::default(), 0, 10)
            .await
            .unwrap();
        let titles: Vec<_> = items.iter().map(|t| t.title.as_str()).collect();

        assert_eq!(titles, vec!["newest", "tie b", "tie a", "oldest"]);
    }

    #[tokio::test]
    async fn test_list_and_count_respect_filter() {
        let persistence = test_persistence().await;
        let base = Utc::now();

        persistence
            .insert_todo(&record("Buy MILK", base))
            .await
            .unwrap();
        persistence
            .insert_todo(&record("walk the dog", base - Duration::seconds(1)))
            .await
            .unwrap();
        persistence
            .insert_todo(&record("milkshake", base - Duration::seconds(2)))
            .await
            .unwrap();

        let filter = ListFilter::from_query(Some("milk"));
        let count = persistence.count_todos(&filter).await.unwrap();
        let items = persistence.list_todos(&filter, 0, 10).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Buy MILK");
        assert_eq!(items[1].title, "milkshake");
    }

    #[tokio::test]
    async fn test_filter_folds_ascii_and_keeps_non_ascii_case() {
        let persistence = test_persistence().await;
        persistence
            .insert_todo(&record("École Primaire", Utc::now()))
            .await
            .unwrap();

        for q in ["École", "ÉCOLE", "École PRIMAIRE", "primaire"] {
            let filter = ListFilter::from_query(Some(q));
            assert_eq!(persistence.count_todos(&filter).await.unwrap(), 1, "q = {}", q);
        }

        let filter = ListFilter::from_query(Some("école"));
        assert_eq!(persistence.count_todos(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filter_does_not_interpret_wildcards() {
        let persistence = test_persistence().await;
        persistence
            .insert_todo(&record("100% done", Utc::now()))
            .await
            .unwrap();
        persistence
            .insert_todo(&record("plain", Utc::now()))
            .await
            .unwrap();

        let count = persistence
            .count_todos(&ListFilter::from_query(Some("%")))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let count = persistence
            .count_todos(&ListFilter::from_query(Some("_")))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_list_offset_and_limit() {
        let persistence = test_persistence().await;
        let base = Utc::now();

        for i in 0..5 {
            persistence
                .insert_todo(&record(&format!("todo {}", i), base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let page = persistence
            .list_todos(&ListFilter::default(), 2, 2)
            .await
            .unwrap();
        let titles: Vec<_> = page.iter().map(|t| t.title.as_str()).collect();

        assert_eq!(titles, vec!["todo 2", "todo 1"]);
    }

    #[tokio::test]
    async fn test_update_todo_partial() {
        let persistence = test_persistence().await;
        let created = (Utc::now() - Duration::seconds(60)).trunc_subsecs(6);
        let todo = record("Walk dog", created);
        persistence.insert_todo(&todo).await.unwrap();

        let later = Utc::now().trunc_subsecs(6);
        let updated = persistence
            .update_todo(
                &todo.id,
                &TodoChanges {
                    title: None,
                    done: Some(true),
                },
                later,
            )
            .await
            .unwrap()
            .expect("Todo should exist");

        assert_eq!(updated.title, "Walk dog");
        assert!(updated.done);
        assert_eq!(updated.created_at, created);
        assert_eq!(updated.updated_at, later);

        let updated = persistence
            .update_todo(
                &todo.id,
                &TodoChanges {
                    title: Some("Walk cat".to_string()),
                    done: None,
                },
                Utc::now(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Walk cat");
        assert!(updated.done);
    }

    #[tokio::test]
    async fn test_update_todo_not_found() {
        let persistence = test_persistence().await;

        let result = persistence
            .update_todo("missing", &TodoChanges::default(), Utc::now())
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_todo() {
        let persistence = test_persistence().await;
        let todo = record("Temporary", Utc::now());
        persistence.insert_todo(&todo).await.unwrap();

        assert!(persistence.delete_todo(&todo.id).await.unwrap());
        assert!(!persistence.delete_todo(&todo.id).await.unwrap());
        assert!(persistence.get_todo(&todo.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_title_rejected_by_schema() {
        let persistence = test_persistence().await;
        let todo = record("   ", Utc::now());

        let err = persistence.insert_todo(&todo).await.unwrap_err();
        assert!(matches!(err, TodoError::StoreOperation { .. }));
    }

    #[tokio::test]
    async fn test_ping_and_close() {
        let persistence = test_persistence().await;

        persistence.ping().await.expect("ping should succeed");
        persistence.close().await;
        persistence.close().await;

        let err = persistence.ping().await.unwrap_err();
        assert!(matches!(err, TodoError::StoreUnavailable));
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("todos.db");
        let uri = format!("sqlite:{}", path.display());

        let persistence = SqlitePersistence::connect(&uri, &ConnectOptions::default())
            .await
            .expect("Failed to open file database");
        persistence.ping().await.unwrap();
        persistence.close().await;

        assert!(path.exists());
    }
}
