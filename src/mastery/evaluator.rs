use serde::Serialize;

use super::config::MasteryThresholds;
use super::types::{MasteryState, StatRecord};

/// Mastery score in [0, 1]: accuracy discounted by inconsistency.
/// A learner who never practised the subject scores 0.
pub fn score(record: Option<&StatRecord>) -> f64 {
    let Some(record) = record else {
        return 0.0;
    };
    let consistency = (1.0 - record.volatility).max(0.0);
    let value = record.average * consistency;
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Classifies a record. Rules are checked in order; the first match wins.
pub fn classify(record: Option<&StatRecord>, thresholds: &MasteryThresholds) -> MasteryState {
    let Some(record) = record else {
        return MasteryState::NotStarted;
    };

    if record.total_outcomes < thresholds.min_total_outcomes_for_mastery {
        return MasteryState::Learning;
    }

    if is_mastered(record, thresholds) {
        return MasteryState::Mastered;
    }

    if record.total_outcomes >= thresholds.struggling_floor
        && record.average < thresholds.struggling_average_ceiling
        && record.volatility >= thresholds.max_volatility_for_mastery
    {
        return MasteryState::Struggling;
    }

    MasteryState::Unmastered
}

fn is_mastered(record: &StatRecord, thresholds: &MasteryThresholds) -> bool {
    record.average >= thresholds.min_average_for_mastery
        && record.volatility <= thresholds.max_volatility_for_mastery
}

/// Record filter used by stats queries.
///
/// These are range constraints over stored fields, so `Unmastered` also
/// admits records that [`classify`] would call `Struggling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MasteryFilter {
    All,
    Mastered,
    Unmastered,
    Struggling,
}

impl MasteryFilter {
    /// Unrecognised values fall back to `All`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("mastered") => MasteryFilter::Mastered,
            Some("unmastered") => MasteryFilter::Unmastered,
            Some("struggling") => MasteryFilter::Struggling,
            _ => MasteryFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryFilter::All => "all",
            MasteryFilter::Mastered => "mastered",
            MasteryFilter::Unmastered => "unmastered",
            MasteryFilter::Struggling => "struggling",
        }
    }

    pub fn matches(&self, record: &StatRecord, thresholds: &MasteryThresholds) -> bool {
        match self {
            MasteryFilter::All => record.total_outcomes >= 0,
            MasteryFilter::Mastered => {
                record.total_outcomes >= thresholds.min_total_outcomes_for_mastery
                    && is_mastered(record, thresholds)
            }
            MasteryFilter::Unmastered => {
                record.total_outcomes >= thresholds.min_total_outcomes_for_mastery
                    && !is_mastered(record, thresholds)
            }
            MasteryFilter::Struggling => {
                record.total_outcomes >= thresholds.struggling_floor
                    && record.average < thresholds.struggling_average_ceiling
                    && record.volatility >= thresholds.max_volatility_for_mastery
            }
        }
    }
}
