//! `SQLite` connection pool and schema bootstrap.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::{AppError, Result};

use super::schema;

/// Alias for the shared `SQLite` pool.
pub type Database = SqlitePool;

/// Open (creating if needed) the `SQLite` file at `path` and apply the schema.
///
/// # Errors
///
/// Returns `AppError::Db` if the directory, connection, or schema
/// bootstrap fails.
pub async fn connect(path: impl AsRef<Path>) -> Result<Database> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| AppError::Db(format!("failed to create db dir: {err}")))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database with the schema applied.
///
/// The pool is pinned to a single connection that never expires, since
/// every `SQLite` memory connection is a separate database.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema bootstrap fails.
pub async fn connect_memory() -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
