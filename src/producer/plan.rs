//! Historical averages and percent weights for declared steps.

use crate::models::step::StepData;
use crate::persistence::Counters;

/// Counter key accumulating the total run time of `step_id` in milliseconds.
#[must_use]
pub fn total_time_key(step_id: &str) -> String {
    format!("{step_id}.totalTime")
}

/// Counter key accumulating the number of completed runs of `step_id`.
#[must_use]
pub fn count_key(step_id: &str) -> String {
    format!("{step_id}.count")
}

/// Both counter keys for every step id, in order.
#[must_use]
pub fn counter_keys<'a>(step_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    step_ids
        .into_iter()
        .flat_map(|id| [total_time_key(id), count_key(id)])
        .collect()
}

/// Average duration of `step_id` from `history`, falling back to `guessed_time_ms`.
///
/// History is used only when both the total time and the count are present
/// and non-zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_time_ms(history: &Counters, step_id: &str, guessed_time_ms: u64) -> f64 {
    let total = history.get(&total_time_key(step_id)).copied().unwrap_or(0);
    let count = history.get(&count_key(step_id)).copied().unwrap_or(0);

    if total != 0 && count != 0 {
        total as f64 / count as f64
    } else {
        guessed_time_ms as f64
    }
}

/// Round to two decimal places.
#[must_use]
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Identity and timing inputs of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    /// Identifier, unique within one operation.
    pub id: String,
    /// Human-readable message.
    pub message: String,
    /// Duration guess used when there is no history.
    pub guessed_time_ms: u64,
}

/// Build the wire descriptor of every step from `history`.
///
/// Weights are each step's share of the summed averages. If every
/// average is zero the weight is split evenly.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn plan_steps<'a>(
    specs: impl IntoIterator<Item = &'a StepSpec>,
    history: &Counters,
) -> Vec<StepData> {
    let averages: Vec<(&StepSpec, f64)> = specs
        .into_iter()
        .map(|spec| {
            let average = average_time_ms(history, &spec.id, spec.guessed_time_ms);
            (spec, average)
        })
        .collect();

    let total_average: f64 = averages.iter().map(|(_, average)| average).sum();
    let even_share = 100.0 / averages.len().max(1) as f64;

    averages
        .into_iter()
        .map(|(spec, average)| {
            let share = if total_average > 0.0 {
                average / total_average * 100.0
            } else {
                even_share
            };
            StepData {
                percent: round_percent(share),
                average_completion_time_in_ms: average.round().max(0.0) as u64,
                message: spec.message.clone(),
            }
        })
        .collect()
}
