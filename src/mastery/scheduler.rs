//! Weighted random ordering of practice items.
//!
//! Each item draws `key = -ln(U) / weight` with `U ~ Uniform(0, 1]` and the
//! items are sorted ascending by key (Efraimidis-Spirakis). This is
//! equivalent to repeatedly drawing without replacement with probability
//! proportional to the remaining weights.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use super::evaluator::score;
use super::types::StatRecord;

/// Anything the scheduler can place; identified by its item id.
pub trait Schedulable {
    fn item_id(&self) -> &str;
}

impl Schedulable for String {
    fn item_id(&self) -> &str {
        self.as_str()
    }
}

impl Schedulable for Value {
    fn item_id(&self) -> &str {
        self.as_str()
            .or_else(|| self.get("id").and_then(Value::as_str))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveScheduler {
    weight_floor: f64,
    seed: Option<u64>,
}

impl AdaptiveScheduler {
    pub fn new(weight_floor: f64) -> Self {
        Self {
            weight_floor: sanitize_floor(weight_floor),
            seed: None,
        }
    }

    /// Every call made with this scheduler reproduces the same draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn weight_floor(&self) -> f64 {
        self.weight_floor
    }

    /// Selection weight: unmastered subjects weigh more, none weighs zero.
    pub fn weight(&self, record: Option<&StatRecord>) -> f64 {
        (1.0 - score(record)).max(0.0) + self.weight_floor
    }

    pub fn order<T: Schedulable>(&self, items: Vec<T>, stats: &HashMap<String, StatRecord>) -> Vec<T> {
        match self.seed {
            Some(seed) => self.order_with_rng(items, stats, &mut ChaCha8Rng::seed_from_u64(seed)),
            None => self.order_with_rng(items, stats, &mut rand::rng()),
        }
    }

    pub fn order_with_rng<T, R>(&self, items: Vec<T>, stats: &HashMap<String, StatRecord>, rng: &mut R) -> Vec<T>
    where
        T: Schedulable,
        R: Rng,
    {
        let weights: Vec<f64> = items
            .iter()
            .map(|item| {
                let record = stats.get(item.item_id());
                let weight = self.weight(record);
                tracing::debug!(
                    item_id = item.item_id(),
                    weight,
                    mastery_score = score(record),
                    "scheduling weight"
                );
                weight
            })
            .collect();
        self.order_by_weights(items, &weights, rng)
    }

    /// Orders `items` by raw weights. Weights that are missing, non-finite
    /// or below the floor are raised to the floor, so the result is always a
    /// permutation and all-zero weights degrade to a uniform shuffle.
    pub fn order_by_weights<T, R>(&self, items: Vec<T>, weights: &[f64], rng: &mut R) -> Vec<T>
    where
        R: Rng,
    {
        if items.len() <= 1 {
            return items;
        }

        let mut keyed: Vec<(f64, usize)> = (0..items.len())
            .map(|idx| {
                let weight = weights
                    .get(idx)
                    .copied()
                    .filter(|w| w.is_finite())
                    .unwrap_or(0.0)
                    .max(self.weight_floor);
                // (0, 1]: ln never sees zero
                let u = 1.0 - rng.random::<f64>();
                (-u.ln() / weight, idx)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        keyed
            .into_iter()
            .filter_map(|(_, idx)| slots[idx].take())
            .collect()
    }
}

impl Default for AdaptiveScheduler {
    fn default() -> Self {
        Self::new(0.05)
    }
}

fn sanitize_floor(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        f64::MIN_POSITIVE
    }
}
