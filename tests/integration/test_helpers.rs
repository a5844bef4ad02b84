//! Shared fixtures for integration tests.

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use progress_stream::config::{GlobalConfig, OperationConfig, SimulatedStepConfig};
use progress_stream::consumer::connection::{Incoming, StreamConnection};
use progress_stream::consumer::observer::ProgressObserver;
use progress_stream::models::step::{DelayReason, StepData};
use progress_stream::persistence::{CounterStore, Counters};
use progress_stream::producer::server::{serve_on, AppState};
use progress_stream::{AppError, Result};

/// Connection replaying a fixed script of events.
///
/// Once the script is exhausted it reports end of stream.
pub struct ScriptedConnection {
    script: VecDeque<Result<Incoming>>,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedConnection {
    pub fn new(script: impl IntoIterator<Item = Result<Incoming>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl StreamConnection for ScriptedConnection {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Incoming>>> + Send + '_>> {
        let next = self.script.pop_front();
        Box::pin(async move {
            tokio::task::yield_now().await;
            next
        })
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connection that stays open without ever delivering an event.
#[derive(Default)]
pub struct SilentConnection {
    pub closes: Arc<AtomicUsize>,
}

impl StreamConnection for SilentConnection {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Incoming>>> + Send + '_>> {
        Box::pin(std::future::pending())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn closes(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub fn step_data(percent: f64, average_ms: u64, message: &str) -> StepData {
    StepData {
        percent,
        average_completion_time_in_ms: average_ms,
        message: message.to_owned(),
    }
}

/// Observer notification, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Percent(f64),
    Message(Option<String>),
    Delay(Option<DelayReason>),
}

#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Option<String>> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn last_percent(&self) -> Option<f64> {
        self.events().into_iter().rev().find_map(|seen| match seen {
            Seen::Percent(p) => Some(p),
            _ => None,
        })
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_progress_change(&self, percent: f64) {
        self.seen.lock().unwrap().push(Seen::Percent(percent));
    }

    fn on_message_change(&self, message: Option<&str>) {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Message(message.map(str::to_owned)));
    }

    fn on_delay_reason(&self, reason: Option<DelayReason>) {
        self.seen.lock().unwrap().push(Seen::Delay(reason));
    }
}

/// Which half of the store should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Read,
    Write,
}

/// Counter store that errors on reads or writes.
pub struct FailingStore {
    pub fail_on: FailOn,
}

impl CounterStore for FailingStore {
    fn get_counters<'a>(
        &'a self,
        _keys: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Counters>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_on == FailOn::Read {
                Err(AppError::Db("counter read unavailable".into()))
            } else {
                Ok(Counters::new())
            }
        })
    }

    fn increment_counters(
        &self,
        _increments: Counters,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_on == FailOn::Write {
                Err(AppError::Db("counter write unavailable".into()))
            } else {
                Ok(())
            }
        })
    }
}

pub fn simulated(id: &str, message: &str, guessed_time_ms: u64, duration_ms: u64) -> SimulatedStepConfig {
    SimulatedStepConfig {
        id: id.to_owned(),
        message: message.to_owned(),
        guessed_time_ms,
        duration_ms,
        fail: false,
    }
}

/// Config with a succeeding `import` operation and a failing `broken` one.
pub fn test_config() -> GlobalConfig {
    let mut config = GlobalConfig::default();
    config.operations.insert(
        "import".to_owned(),
        OperationConfig {
            steps: vec![
                simulated("fetch", "Fetching records", 100, 20),
                simulated("store", "Storing records", 300, 30),
            ],
        },
    );
    let mut failing = simulated("x", "Exploding", 50, 5);
    failing.fail = true;
    config.operations.insert(
        "broken".to_owned(),
        OperationConfig {
            steps: vec![simulated("prepare", "Preparing", 50, 5), failing],
        },
    );
    config
}

/// Running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    ct: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(config: GlobalConfig, store: Arc<dyn CounterStore>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(AppState {
            config: Arc::new(config),
            store,
        });
        let ct = CancellationToken::new();
        let handle = tokio::spawn(serve_on(listener, state, ct.clone()));
        Self { addr, ct, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn stop(self) {
        self.ct.cancel();
        self.handle.await.expect("join").expect("serve");
    }
}

/// Split a raw event-stream body into `(id, event, data)` triples.
pub fn parse_frames(body: &str) -> Vec<(u64, String, String)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut id = 0;
            let mut event = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("id: ") {
                    id = value.parse().expect("numeric id");
                } else if let Some(value) = line.strip_prefix("event: ") {
                    event = value.to_owned();
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = value.to_owned();
                }
            }
            (id, event, data)
        })
        .collect()
}
