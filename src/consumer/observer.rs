//! Callbacks notified as a streamed operation progresses.

use crate::models::step::DelayReason;

/// Receives progress updates for one operation.
///
/// Callbacks run on runtime worker threads and must not block.
pub trait ProgressObserver: Send + Sync {
    /// Completion percentage, 0–100.
    fn on_progress_change(&self, percent: f64);

    /// Message of the running step, `None` once the operation completed.
    fn on_message_change(&self, message: Option<&str>);

    /// Delay classification of the running step.
    fn on_delay_reason(&self, reason: Option<DelayReason>);
}

/// [`ProgressObserver`] built from three closures.
pub struct CallbackObserver<P, M, D> {
    on_progress: P,
    on_message: M,
    on_delay: D,
}

impl<P, M, D> CallbackObserver<P, M, D>
where
    P: Fn(f64) + Send + Sync,
    M: Fn(Option<&str>) + Send + Sync,
    D: Fn(Option<DelayReason>) + Send + Sync,
{
    /// Wrap the percent, message, and delay-reason callbacks.
    #[must_use]
    pub fn new(on_progress: P, on_message: M, on_delay: D) -> Self {
        Self {
            on_progress,
            on_message,
            on_delay,
        }
    }
}

impl<P, M, D> ProgressObserver for CallbackObserver<P, M, D>
where
    P: Fn(f64) + Send + Sync,
    M: Fn(Option<&str>) + Send + Sync,
    D: Fn(Option<DelayReason>) + Send + Sync,
{
    fn on_progress_change(&self, percent: f64) {
        (self.on_progress)(percent);
    }

    fn on_message_change(&self, message: Option<&str>) {
        (self.on_message)(message);
    }

    fn on_delay_reason(&self, reason: Option<DelayReason>) {
        (self.on_delay)(reason);
    }
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress_change(&self, _percent: f64) {}

    fn on_message_change(&self, _message: Option<&str>) {}

    fn on_delay_reason(&self, _reason: Option<DelayReason>) {}
}
