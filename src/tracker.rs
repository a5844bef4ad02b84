//! Progress estimation over announced steps and wall-clock time.
//!
//! A [`ProgressTracker`] knows which step is currently running, how much
//! of the operation it weighs, and how long it historically takes. From
//! that it estimates a completion percentage that ramps linearly up to
//! [`HAPPY_PATH_THRESHOLD`] of the step's average duration and then
//! follows a logarithmic tail, so the number keeps moving on slow steps
//! without ever claiming the step is done before the next one starts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::models::step::{DelayReason, StepData};

/// Fraction of the average duration considered the linear "happy path".
pub const HAPPY_PATH_THRESHOLD: f64 = 0.8;

/// Overrun (in multiples of the average) at which the log tail reaches 1.0.
pub const OVERRUN_SPAN: f64 = 4.0;

/// Elapsed time after which a step within its average is reported as `normal`.
pub const NORMAL_DELAY_AFTER_MS: f64 = 5000.0;

/// Elapsed time after which a step over its average is reported as `unexpected`.
pub const UNEXPECTED_DELAY_AFTER_MS: f64 = 2000.0;

/// Averages below this are clamped to keep the ramp finite.
const MIN_AVERAGE_MS: f64 = 1.0;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the present instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Estimated completed fraction (0.0–1.0) of a step.
///
/// Linear while `elapsed / average` is below [`HAPPY_PATH_THRESHOLD`],
/// then `threshold + (1 - threshold) * min(1, log10(1 + 9 * overrun))`
/// where `overrun` is the time past the threshold in units of
/// `average * OVERRUN_SPAN`.
#[must_use]
pub fn step_fraction(elapsed_ms: f64, average_ms: f64) -> f64 {
    let average = average_ms.max(MIN_AVERAGE_MS);
    let ratio = elapsed_ms / average;

    if ratio < HAPPY_PATH_THRESHOLD {
        return ratio;
    }

    let overrun = (elapsed_ms - average * HAPPY_PATH_THRESHOLD) / (average * OVERRUN_SPAN);
    let tail = (1.0 + 9.0 * overrun).log10().min(1.0);
    HAPPY_PATH_THRESHOLD + (1.0 - HAPPY_PATH_THRESHOLD) * tail
}

/// Classify how a running step compares to its historical average.
#[must_use]
pub fn delay_reason_for(elapsed_ms: f64, average_ms: f64) -> Option<DelayReason> {
    if elapsed_ms > NORMAL_DELAY_AFTER_MS && elapsed_ms < average_ms {
        Some(DelayReason::Normal)
    } else if elapsed_ms > UNEXPECTED_DELAY_AFTER_MS && elapsed_ms > average_ms {
        Some(DelayReason::Unexpected)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
struct InProgress {
    step: StepData,
    started_at: Instant,
}

/// Estimation state for one streamed operation.
pub struct ProgressTracker {
    clock: Arc<dyn Clock>,
    committed_percent: f64,
    in_progress: Option<InProgress>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("committed_percent", &self.committed_percent)
            .field("in_progress", &self.in_progress)
            .finish_non_exhaustive()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Tracker reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Tracker reading an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            committed_percent: 0.0,
            in_progress: None,
        }
    }

    /// Announce that `step` has started.
    ///
    /// The previously running step, if any, is counted as fully complete.
    pub fn add_step(&mut self, step: StepData) {
        if let Some(previous) = self.in_progress.take() {
            self.committed_percent += previous.step.percent;
        }
        self.in_progress = Some(InProgress {
            step,
            started_at: self.clock.now(),
        });
    }

    /// Percent contributed by steps that have been replaced.
    #[must_use]
    pub fn committed_percent(&self) -> f64 {
        self.committed_percent
    }

    /// Committed percent plus the estimated share of the running step.
    #[must_use]
    pub fn current_percent(&self) -> f64 {
        let Some(current) = &self.in_progress else {
            return self.committed_percent;
        };

        let fraction = step_fraction(
            self.elapsed_ms(current),
            average_ms(&current.step),
        );
        self.committed_percent + current.step.percent * fraction
    }

    /// Message of the running step.
    #[must_use]
    pub fn current_message(&self) -> Option<&str> {
        self.in_progress.as_ref().map(|p| p.step.message.as_str())
    }

    /// Delay classification of the running step.
    #[must_use]
    pub fn delay_reason(&self) -> Option<DelayReason> {
        let current = self.in_progress.as_ref()?;
        delay_reason_for(self.elapsed_ms(current), average_ms(&current.step))
    }

    #[allow(clippy::cast_precision_loss)]
    fn elapsed_ms(&self, current: &InProgress) -> f64 {
        let elapsed = self.clock.now().saturating_duration_since(current.started_at);
        elapsed.as_nanos() as f64 / 1_000_000.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn average_ms(step: &StepData) -> f64 {
    step.average_completion_time_in_ms as f64
}
