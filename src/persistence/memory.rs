//! In-process [`CounterStore`] for tests and embedding without a database.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use crate::Result;

use super::{CounterStore, Counters};

/// Counter store holding values in a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<Counters>,
}

impl MemoryCounterStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `counters`.
    #[must_use]
    pub fn with_counters<K: Into<String>>(counters: impl IntoIterator<Item = (K, i64)>) -> Self {
        Self {
            counters: Mutex::new(
                counters
                    .into_iter()
                    .map(|(key, value)| (key.into(), value))
                    .collect(),
            ),
        }
    }

    /// Copy of every stored counter.
    #[must_use]
    pub fn snapshot(&self) -> Counters {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CounterStore for MemoryCounterStore {
    fn get_counters<'a>(
        &'a self,
        keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Counters>> + Send + 'a>> {
        Box::pin(async move {
            let counters = self.lock();
            Ok(keys
                .iter()
                .filter_map(|key| counters.get(key).map(|value| (key.clone(), *value)))
                .collect())
        })
    }

    fn increment_counters(
        &self,
        increments: Counters,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut counters = self.lock();
            for (key, delta) in increments {
                *counters.entry(key).or_insert(0) += delta;
            }
            Ok(())
        })
    }
}
