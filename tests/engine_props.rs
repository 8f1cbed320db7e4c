//! Property tests for the stat fold, the mastery score and the scheduler.

use std::collections::HashMap;

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use danci_mastery::mastery::updater;
use danci_mastery::mastery::{
    classify, score, AdaptiveScheduler, MasteryState, MasteryThresholds, OutcomeEvent, StatKey,
    StatRecord,
};

fn arb_outcomes() -> impl Strategy<Value = Vec<(bool, Option<f64>)>> {
    prop::collection::vec((any::<bool>(), proptest::option::of(0.0f64..600.0)), 1..60)
}

fn arb_decay() -> impl Strategy<Value = f64> {
    (1u32..100u32).prop_map(|v| v as f64 / 100.0)
}

fn replay(outcomes: &[(bool, Option<f64>)], decay: f64) -> Vec<StatRecord> {
    let key = StatKey::item("u1", "w1");
    let mut current: Option<StatRecord> = None;
    let mut history = Vec::with_capacity(outcomes.len());
    for (i, (outcome, duration)) in outcomes.iter().enumerate() {
        let mut event = OutcomeEvent::new("w1", i as i64, *outcome);
        event.duration = *duration;
        let next = updater::update(current.as_ref(), &key, &event, decay).unwrap();
        history.push(next.clone());
        current = Some(next);
    }
    history
}

proptest! {
    #[test]
    fn prop_stats_stay_in_bounds(outcomes in arb_outcomes(), decay in arb_decay()) {
        for record in replay(&outcomes, decay) {
            prop_assert!((0.0..=1.0).contains(&record.average));
            prop_assert!((0.0..=1.0).contains(&record.volatility));
            prop_assert!(record.duration >= 0.0);
            let s = score(Some(&record));
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn prop_total_counts_every_event(outcomes in arb_outcomes(), decay in arb_decay()) {
        let history = replay(&outcomes, decay);
        for (i, record) in history.iter().enumerate() {
            prop_assert_eq!(record.total_outcomes, i as i64 + 1);
        }
        let last = history.last().unwrap();
        prop_assert_eq!(last.last_updated, outcomes.len() as i64 - 1);
    }

    #[test]
    fn prop_all_correct_never_leaves_full_score(n in 1usize..40, decay in arb_decay()) {
        let outcomes = vec![(true, None); n];
        let last = replay(&outcomes, decay).pop().unwrap();
        prop_assert_eq!(last.average, 1.0);
        prop_assert_eq!(last.volatility, 0.0);
        prop_assert_eq!(score(Some(&last)), 1.0);
    }

    #[test]
    fn prop_classification_is_total(outcomes in arb_outcomes()) {
        let thresholds = MasteryThresholds::default();
        let last = replay(&outcomes, 0.25).pop().unwrap();
        let state = classify(Some(&last), &thresholds);
        if last.total_outcomes < thresholds.min_total_outcomes_for_mastery {
            prop_assert_eq!(state, MasteryState::Learning);
        } else {
            prop_assert_ne!(state, MasteryState::NotStarted);
            prop_assert_ne!(state, MasteryState::Learning);
        }
    }

    #[test]
    fn prop_schedule_is_permutation(
        weights in prop::collection::vec(0.0f64..2.0, 0..50),
        seed in any::<u64>(),
    ) {
        let items: Vec<String> = (0..weights.len()).map(|i| format!("w{i}")).collect();
        let scheduler = AdaptiveScheduler::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut ordered = scheduler.order_by_weights(items.clone(), &weights, &mut rng);
        ordered.sort();
        let mut expected = items;
        expected.sort();
        prop_assert_eq!(ordered, expected);
    }

    #[test]
    fn prop_seeded_schedule_is_reproducible(n in 0usize..30, seed in any::<u64>()) {
        let items: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
        let scheduler = AdaptiveScheduler::default().with_seed(seed);
        let stats = HashMap::new();
        prop_assert_eq!(
            scheduler.order(items.clone(), &stats),
            scheduler.order(items, &stats)
        );
    }
}
