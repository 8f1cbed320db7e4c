use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryThresholds {
    pub min_total_outcomes_for_mastery: i64,
    pub min_average_for_mastery: f64,
    pub max_volatility_for_mastery: f64,
    pub struggling_floor: i64,
    pub struggling_average_ceiling: f64,
}

impl Default for MasteryThresholds {
    fn default() -> Self {
        Self {
            min_total_outcomes_for_mastery: 5,
            min_average_for_mastery: 0.8,
            max_volatility_for_mastery: 0.3,
            struggling_floor: 10,
            struggling_average_ceiling: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasteryConfig {
    /// EWMA decay applied to average, volatility and duration.
    pub decay: f64,
    pub thresholds: MasteryThresholds,
    /// Added to every scheduling weight so no item is starved.
    pub weight_floor: f64,
    pub scheduler_seed: Option<u64>,
    pub storage_retry: RetryPolicy,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            decay: 0.25,
            thresholds: MasteryThresholds::default(),
            weight_floor: 0.05,
            scheduler_seed: None,
            storage_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("decay must be in (0, 1), got {0}")]
    Decay(f64),
    #[error("weight floor must be positive, got {0}")]
    WeightFloor(f64),
    #[error("{name} must be in [0, 1], got {value}")]
    Ratio { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("storage retry attempts must be at least 1")]
    RetryAttempts,
}

impl MasteryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<f64>("MASTERY_DECAY") {
            config.decay = v;
        }
        if let Some(v) = env_parse::<i64>("MASTERY_MIN_TOTAL_OUTCOMES") {
            config.thresholds.min_total_outcomes_for_mastery = v;
        }
        if let Some(v) = env_parse::<f64>("MASTERY_MIN_AVERAGE") {
            config.thresholds.min_average_for_mastery = v;
        }
        if let Some(v) = env_parse::<f64>("MASTERY_MAX_VOLATILITY") {
            config.thresholds.max_volatility_for_mastery = v;
        }
        if let Some(v) = env_parse::<i64>("MASTERY_STRUGGLING_FLOOR") {
            config.thresholds.struggling_floor = v;
        }
        if let Some(v) = env_parse::<f64>("MASTERY_STRUGGLING_CEILING") {
            config.thresholds.struggling_average_ceiling = v;
        }
        if let Some(v) = env_parse::<f64>("SCHEDULER_WEIGHT_FLOOR") {
            config.weight_floor = v;
        }
        config.scheduler_seed = env_parse::<u64>("SCHEDULER_SEED");
        if let Some(v) = env_parse::<u32>("STORAGE_RETRY_ATTEMPTS") {
            config.storage_retry.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("STORAGE_RETRY_BACKOFF_MS") {
            config.storage_retry.backoff = Duration::from_millis(v);
        }

        match config.validate() {
            Ok(()) => config,
            Err(err) => {
                tracing::warn!(error = %err, "invalid mastery config from env, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(ConfigError::Decay(self.decay));
        }
        if !(self.weight_floor > 0.0 && self.weight_floor.is_finite()) {
            return Err(ConfigError::WeightFloor(self.weight_floor));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("minAverageForMastery", t.min_average_for_mastery),
            ("strugglingAverageCeiling", t.struggling_average_ceiling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Ratio { name, value });
            }
        }
        if !(t.max_volatility_for_mastery >= 0.0) {
            return Err(ConfigError::Negative {
                name: "maxVolatilityForMastery",
                value: t.max_volatility_for_mastery,
            });
        }
        for (name, value) in [
            ("minTotalOutcomesForMastery", t.min_total_outcomes_for_mastery),
            ("strugglingFloor", t.struggling_floor),
        ] {
            if value < 0 {
                return Err(ConfigError::Negative {
                    name,
                    value: value as f64,
                });
            }
        }
        if self.storage_retry.max_attempts == 0 {
            return Err(ConfigError::RetryAttempts);
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable env value");
            None
        }
    }
}
