//! Persistence layer for historical step counters.
//!
//! The producer depends only on the [`CounterStore`] trait. Two
//! implementations ship with the crate: [`counter_repo::CounterRepo`]
//! backed by `SQLite`, and [`memory::MemoryCounterStore`] kept in process.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::Result;

pub mod counter_repo;
pub mod db;
pub mod memory;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Counter values keyed by `"<stepId>.totalTime"` / `"<stepId>.count"`.
pub type Counters = HashMap<String, i64>;

/// Batched accumulator storage consumed by the producer.
///
/// Both calls are batched: one read when an operation starts, one
/// increment when it has finished.
pub trait CounterStore: Send + Sync {
    /// Read the current value of every key in `keys`.
    ///
    /// Keys that were never incremented are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the backing store cannot be read.
    fn get_counters<'a>(
        &'a self,
        keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Counters>> + Send + 'a>>;

    /// Add each delta in `increments` to its counter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the backing store cannot be written.
    fn increment_counters(
        &self,
        increments: Counters,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
