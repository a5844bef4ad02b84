//! Unit tests for the in-process counter store.

use progress_stream::persistence::memory::MemoryCounterStore;
use progress_stream::persistence::{CounterStore, Counters};

#[tokio::test]
async fn unknown_keys_are_absent() {
    let store = MemoryCounterStore::new();
    let values = store
        .get_counters(&["a.count".to_owned()])
        .await
        .expect("read");
    assert!(values.is_empty());
}

#[tokio::test]
async fn returns_only_requested_keys() {
    let store = MemoryCounterStore::with_counters([("a.count", 2), ("b.count", 5)]);
    let values = store
        .get_counters(&["a.count".to_owned(), "c.count".to_owned()])
        .await
        .expect("read");
    assert_eq!(values.len(), 1);
    assert_eq!(values["a.count"], 2);
}

#[tokio::test]
async fn increments_accumulate() {
    let store = MemoryCounterStore::with_counters([("a.totalTime", 100)]);
    let mut delta = Counters::new();
    delta.insert("a.totalTime".into(), 50);
    delta.insert("a.count".into(), 1);

    store.increment_counters(delta.clone()).await.expect("increment");
    store.increment_counters(delta).await.expect("increment");

    let snapshot = store.snapshot();
    assert_eq!(snapshot["a.totalTime"], 200);
    assert_eq!(snapshot["a.count"], 2);
}
