//! Step counter repository for `SQLite` persistence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::Result;

use super::db::Database;
use super::{CounterStore, Counters};

/// Repository wrapper around `SQLite` for step counters.
#[derive(Clone)]
pub struct CounterRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CounterRow {
    key: String,
    value: i64,
}

impl CounterRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Read the counters named in `keys` with a single query.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_many(&self, keys: &[String]) -> Result<Counters> {
        if keys.is_empty() {
            return Ok(Counters::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT key, value FROM step_counter WHERE key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(")");

        let rows: Vec<CounterRow> = builder
            .build_query_as()
            .fetch_all(self.db.as_ref())
            .await?;

        debug!(requested = keys.len(), found = rows.len(), "counters read");
        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    /// Add every delta in `increments` inside one transaction.
    ///
    /// Missing counters are created with the delta as their value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any upsert or the commit fails.
    pub async fn increment_many(&self, increments: &Counters) -> Result<()> {
        if increments.is_empty() {
            return Ok(());
        }

        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;
        for (key, delta) in increments {
            sqlx::query(
                "INSERT INTO step_counter (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = step_counter.value + excluded.value,
                     updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(delta)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = increments.len(), "counters incremented");
        Ok(())
    }
}

impl CounterStore for CounterRepo {
    fn get_counters<'a>(
        &'a self,
        keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Counters>> + Send + 'a>> {
        Box::pin(self.get_many(keys))
    }

    fn increment_counters(
        &self,
        increments: Counters,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.increment_many(&increments).await })
    }
}
