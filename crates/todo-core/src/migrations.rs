// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded schema for the `todos` table.
//!
//! Applied by [`PostgresPersistence::connect`](crate::PostgresPersistence::connect)
//! and [`SqlitePersistence::connect`](crate::SqlitePersistence::connect) on
//! every new pool; already-applied versions are skipped.

use sqlx::migrate::MigrateError;

/// PostgreSQL schema.
pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

/// SQLite schema.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Bring a PostgreSQL pool up to the current schema.
pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    POSTGRES.run(pool).await
}

/// Bring a SQLite pool up to the current schema.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
