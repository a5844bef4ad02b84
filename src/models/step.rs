//! Wire-level step descriptors and delay classification.

use serde::{Deserialize, Serialize};

/// Descriptor of one step as transmitted in a `step` event.
///
/// Built by the producer right before the step runs and never mutated
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    /// Weight of this step in the whole operation, 0–100 with two decimals.
    pub percent: f64,
    /// Historical (or guessed) duration of the step in milliseconds.
    pub average_completion_time_in_ms: u64,
    /// Human-readable message shown while the step runs.
    pub message: String,
}

/// Coarse classification of a running step that exceeds expectations.
///
/// Absence of a reason is modelled as `Option::None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelayReason {
    /// The step is long, but still within its historical average.
    Normal,
    /// The step has overrun its historical average.
    Unexpected,
}

impl DelayReason {
    /// Lowercase label used in logs and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Unexpected => "unexpected",
        }
    }
}
