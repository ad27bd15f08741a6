use rand::RngCore;

use super::{dispersal_factor, early_interval_factor, next_easiness, round_float, running_mean};
use crate::config::DrillConfig;
use crate::error::Result;
use crate::matrix::{FactorUpdate, OptimalFactorMatrix};
use crate::models::{ItemState, Quality, UNSCHEDULED};

/// Moves an optimal factor toward the value the rating implies, by
/// `fraction` of the distance.
pub fn modify_optimal_factor(of: f64, quality: Quality, fraction: f64) -> f64 {
    let ideal = of * (0.72 + quality.as_f64() * 0.07);
    (1.0 - fraction) * of + fraction * ideal
}

fn inter_repetition_interval(last_interval: f64, n: i32, of: f64) -> f64 {
    if n == 1 {
        of
    } else {
        of * last_interval
    }
}

/// SuperMemo 5.
///
/// Returns the new state plus the single matrix write this review makes.
/// The write happens on failures too, keyed by the updated easiness, even
/// though a failed item keeps its previous easiness.
pub fn sm5(
    state: &ItemState,
    quality: Quality,
    delta_days: Option<i64>,
    matrix: &OptimalFactorMatrix,
    config: &DrillConfig,
    rng: &mut dyn RngCore,
) -> Result<(ItemState, FactorUpdate)> {
    state.validate()?;
    let n = state.repetitions.max(1);
    let ef = state.easiness_or_default();
    let mean = running_mean(state.mean_quality, state.total_repeats, quality);

    let current_of = matrix.lookup(n, ef, config.sm5_initial_interval);
    let next_ef = next_easiness(ef, quality);
    let mut new_of = modify_optimal_factor(current_of, quality, config.learn_fraction);

    if config.adjust_for_early_late {
        if let Some(delta) = delta_days.filter(|d| *d < 0) {
            let optimal_interval = inter_repetition_interval(state.last_interval, n, current_of);
            new_of = early_interval_factor(current_of, optimal_interval, delta.unsigned_abs() as f64);
        }
    }

    let update = FactorUpdate {
        repetition: n,
        easiness: next_ef,
        factor: round_float(new_of, 3),
    };

    let mut next = state.clone();
    next.mean_quality = Some(mean);
    next.total_repeats = state.total_repeats + 1;

    if quality.is_failure(config.failure_quality_threshold) {
        next.last_interval = UNSCHEDULED;
        next.repetitions = 1;
        next.easiness = Some(ef);
        next.failures = state.failures + 1;
        return Ok((next, update));
    }

    // Reads the matrix as it stood before this review's write.
    let of = matrix.lookup(n, next_ef, config.sm5_initial_interval);
    let mut interval = inter_repetition_interval(state.last_interval, n, of);
    if config.add_random_noise {
        interval *= dispersal_factor(rng);
    }

    next.last_interval = interval;
    next.repetitions = n + 1;
    next.easiness = Some(next_ef);
    Ok((next, update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmKind;
    use crate::srs::tests::{q, quiet_config};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(
        state: &ItemState,
        rating: i32,
        matrix: &OptimalFactorMatrix,
    ) -> (ItemState, FactorUpdate) {
        let mut rng = StdRng::seed_from_u64(2);
        sm5(state, q(rating), None, matrix, &quiet_config(AlgorithmKind::Sm5), &mut rng).unwrap()
    }

    #[test]
    fn fresh_item_gets_initial_interval() {
        let matrix = OptimalFactorMatrix::new();
        for rating in 3..=5 {
            let (next, _) = run(&ItemState::new(), rating, &matrix);
            assert_eq!(next.last_interval, 4.0, "quality {}", rating);
            assert_eq!(next.repetitions, 2);
        }
    }

    #[test]
    fn learned_factor_drives_interval() {
        let mut matrix = OptimalFactorMatrix::new();
        matrix.set(3, 2.6, 3.1);
        let state = ItemState {
            last_interval: 10.0,
            repetitions: 3,
            easiness: Some(2.5),
            total_repeats: 2,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let (next, _) = run(&state, 5, &matrix);
        assert!((next.last_interval - 31.0).abs() < 1e-9);
        assert!((next.easiness.unwrap() - 2.6).abs() < 1e-9);
    }

    #[test]
    fn update_nudges_factor_by_learn_fraction() {
        let matrix = OptimalFactorMatrix::new();
        let state = ItemState {
            last_interval: 6.0,
            repetitions: 2,
            easiness: Some(2.5),
            total_repeats: 1,
            mean_quality: Some(5.0),
            ..ItemState::new()
        };
        let (_, update) = run(&state, 5, &matrix);
        // OF(2, 2.5) defaults to 2.5; ideal 2.5 * 1.07 = 2.675; halfway = 2.5875
        assert_eq!(update.repetition, 2);
        assert!((update.easiness - 2.6).abs() < 1e-9);
        assert!((update.factor - 2.5875).abs() <= 0.0005 + 1e-9);
    }

    #[test]
    fn failure_reverts_easiness_but_still_updates_matrix() {
        let matrix = OptimalFactorMatrix::new();
        let state = ItemState {
            last_interval: 20.0,
            repetitions: 4,
            easiness: Some(2.2),
            failures: 2,
            total_repeats: 6,
            mean_quality: Some(3.5),
            ..ItemState::new()
        };
        let (next, update) = run(&state, 0, &matrix);
        assert_eq!(next.last_interval, -1.0);
        assert_eq!(next.repetitions, 1);
        assert_eq!(next.easiness, Some(2.2));
        assert_eq!(next.failures, 3);
        assert_eq!(update.repetition, 4);
        assert!((update.easiness - 1.4).abs() < 1e-9);
        assert!(update.factor < 2.2);
    }

    #[test]
    fn early_review_overrides_new_factor() {
        let matrix = OptimalFactorMatrix::new();
        let state = ItemState {
            last_interval: 10.0,
            repetitions: 3,
            easiness: Some(2.5),
            total_repeats: 2,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let config = quiet_config(AlgorithmKind::Sm5);
        let mut rng = StdRng::seed_from_u64(2);
        let (_, on_time) = sm5(&state, q(4), None, &matrix, &config, &mut rng).unwrap();
        let (_, early) = sm5(&state, q(4), Some(-5), &matrix, &config, &mut rng).unwrap();
        assert!(early.factor < on_time.factor);
        assert!(early.factor >= 1.0);
    }

    #[test]
    fn quality_four_holds_factor_steady() {
        let config = quiet_config(AlgorithmKind::Sm5);
        let mut matrix = OptimalFactorMatrix::new();
        let mut rng = StdRng::seed_from_u64(4);
        let state = ItemState {
            last_interval: 6.0,
            repetitions: 2,
            easiness: Some(2.5),
            total_repeats: 1,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let mut previous = matrix.lookup(2, 2.5, 4.0);
        for _ in 0..20 {
            let (_, update) = sm5(&state, q(4), None, &matrix, &config, &mut rng).unwrap();
            matrix.apply(&update);
            let now = matrix.lookup(2, 2.5, 4.0);
            // quality 4 implies an ideal of exactly the current factor
            assert!((now - previous).abs() < 1e-3);
            previous = now;
        }
    }
}
