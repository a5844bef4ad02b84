//! Client-side state for one streamed operation.
//!
//! A [`ConsumerSession`] owns the stream connection, the shared
//! [`ProgressTracker`], and the polling task that reports estimates to the
//! observer at a fixed interval. Every terminal transition funnels through
//! [`ConsumerSession::terminate`], which closes the connection and stops
//! polling exactly once.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::models::step::StepData;
use crate::tracker::ProgressTracker;

use super::connection::StreamConnection;
use super::observer::ProgressObserver;

/// Lifecycle of a consumer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Connection requested; no event received yet.
    Connecting,
    /// Connection open and events flowing.
    Streaming,
    /// A `return` event settled the operation.
    Finished,
    /// A `requestError` or transport error settled the operation.
    Failed,
}

impl ConsumerState {
    /// Whether no further events will be processed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Tracker plus the polling flag, guarded together so that no poll
/// callback can run after [`ConsumerSession::terminate`] returns.
#[derive(Debug)]
struct Shared {
    tracker: ProgressTracker,
    polling: bool,
}

/// Owned state of one consumer invocation.
pub struct ConsumerSession<C: StreamConnection> {
    connection: C,
    shared: Arc<Mutex<Shared>>,
    observer: Arc<dyn ProgressObserver>,
    poll_cancel: CancellationToken,
    poll_task: Option<JoinHandle<()>>,
    state: ConsumerState,
}

impl<C: StreamConnection> ConsumerSession<C> {
    /// Start a session with a fresh system-clock tracker.
    ///
    /// Spawns the polling task, so it must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(connection: C, observer: Arc<dyn ProgressObserver>, poll_interval: Duration) -> Self {
        Self::start_with_tracker(connection, observer, poll_interval, ProgressTracker::new())
    }

    /// Start a session around an existing tracker.
    #[must_use]
    pub fn start_with_tracker(
        connection: C,
        observer: Arc<dyn ProgressObserver>,
        poll_interval: Duration,
        tracker: ProgressTracker,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            tracker,
            polling: true,
        }));
        let poll_cancel = CancellationToken::new();
        let poll_task = tokio::spawn(
            poll_tracker(
                Arc::clone(&shared),
                Arc::clone(&observer),
                poll_interval,
                poll_cancel.clone(),
            )
            .instrument(info_span!("progress_poller")),
        );

        Self {
            connection,
            shared,
            observer,
            poll_cancel,
            poll_task: Some(poll_task),
            state: ConsumerState::Connecting,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// The owned connection.
    #[must_use]
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Mutable access to the owned connection, for reading events.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Record that the connection has opened.
    pub fn mark_open(&mut self) {
        if self.state == ConsumerState::Connecting {
            self.state = ConsumerState::Streaming;
        }
    }

    /// Feed a `step` event: advance the tracker, clear the delay reason,
    /// and publish the new message.
    pub fn apply_step(&mut self, step: StepData) {
        if self.state.is_terminal() {
            debug!("step received after termination; ignored");
            return;
        }
        self.state = ConsumerState::Streaming;

        let message = step.message.clone();
        self.lock_shared().tracker.add_step(step);
        self.observer.on_delay_reason(None);
        self.observer.on_message_change(Some(&message));
    }

    /// Settle successfully: clean up, report 100%, clear the message.
    ///
    /// Returns `false` without notifying if the session already ended.
    pub fn complete(&mut self) -> bool {
        if !self.terminate() {
            return false;
        }
        self.state = ConsumerState::Finished;
        self.observer.on_progress_change(100.0);
        self.observer.on_message_change(None);
        true
    }

    /// Settle with a failure: clean up.
    ///
    /// Returns `false` if the session already ended.
    pub fn fail(&mut self) -> bool {
        if !self.terminate() {
            return false;
        }
        self.state = ConsumerState::Failed;
        true
    }

    /// Stop polling and close the connection.
    ///
    /// Idempotent; returns `true` only for the call that did the cleanup.
    pub fn terminate(&mut self) -> bool {
        {
            let mut shared = self.lock_shared();
            if !shared.polling {
                return false;
            }
            shared.polling = false;
        }

        self.poll_cancel.cancel();
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.connection.close();
        debug!("consumer session terminated");
        true
    }

    /// Latest clamped percent estimate.
    #[must_use]
    pub fn current_percent(&self) -> f64 {
        self.lock_shared().tracker.current_percent().min(100.0)
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: StreamConnection> Drop for ConsumerSession<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn poll_tracker(
    shared: Arc<Mutex<Shared>>,
    observer: Arc<dyn ProgressObserver>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !report(&shared, observer.as_ref()) {
                    break;
                }
            }
        }
    }
}

/// Push one estimate to `observer`. Returns `false` once polling stopped.
fn report(shared: &Mutex<Shared>, observer: &dyn ProgressObserver) -> bool {
    let shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if !shared.polling {
        return false;
    }
    observer.on_progress_change(shared.tracker.current_percent().min(100.0));
    observer.on_delay_reason(shared.tracker.delay_reason());
    true
}
