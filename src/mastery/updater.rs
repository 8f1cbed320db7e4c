//! Folding of outcome events into rolling stat records.
//!
//! Average, volatility and duration are exponentially weighted moving
//! statistics. Volatility tracks the decayed absolute deviation of each new
//! outcome from the running average seen *before* that outcome.

use super::types::{OutcomeEvent, StatKey, StatRecord, ValidOutcome};
use super::EngineError;

/// Validates `event` and folds it into `existing`.
///
/// Pure: the result depends only on the arguments. Nothing is written on
/// validation failure since nothing is written at all.
pub fn update(
    existing: Option<&StatRecord>,
    key: &StatKey,
    event: &OutcomeEvent,
    decay: f64,
) -> Result<StatRecord, EngineError> {
    let outcome = event.validate()?;
    Ok(fold(existing, key, &outcome, decay))
}

pub fn fold(
    existing: Option<&StatRecord>,
    key: &StatKey,
    outcome: &ValidOutcome,
    decay: f64,
) -> StatRecord {
    let x = outcome.value();

    let Some(prev) = existing else {
        return StatRecord {
            user_id: key.user_id.clone(),
            subject_id: key.subject_id.clone(),
            subject_kind: key.kind,
            total_outcomes: 1,
            average: x,
            volatility: 0.0,
            duration: outcome.duration.unwrap_or(0.0),
            last_updated: outcome.timestamp,
        };
    };

    let decay = decay.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    let average = ewma(prev.average, x, decay).clamp(0.0, 1.0);
    let deviation = (x - prev.average).abs();
    let volatility = ewma(prev.volatility, deviation, decay).max(0.0);
    let duration = match outcome.duration {
        Some(d) => ewma(prev.duration, d, decay).max(0.0),
        None => prev.duration,
    };

    StatRecord {
        user_id: prev.user_id.clone(),
        subject_id: prev.subject_id.clone(),
        subject_kind: prev.subject_kind,
        total_outcomes: prev.total_outcomes + 1,
        average,
        volatility,
        duration,
        last_updated: prev.last_updated.max(outcome.timestamp),
    }
}

#[inline]
fn ewma(current: f64, sample: f64, decay: f64) -> f64 {
    current + decay * (sample - current)
}
