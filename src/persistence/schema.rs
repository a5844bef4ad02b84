//! `SQLite` schema bootstrap logic.
//!
//! Table definitions use `CREATE TABLE IF NOT EXISTS` and are safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS step_counter (
    key             TEXT PRIMARY KEY NOT NULL,
    value           INTEGER NOT NULL DEFAULT 0,
    updated_at      TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
