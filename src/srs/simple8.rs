use rand::RngCore;

use super::{dispersal_factor, early_interval_factor, running_mean};
use crate::config::DrillConfig;
use crate::error::{DrillError, Result};
use crate::models::{ItemState, Quality, UNSCHEDULED};

/// Lower bound of the interval factor; repeats push it up toward the ease.
const MIN_FACTOR: f64 = 1.2;

/// First interval after `failures` lifetime failures. Shrinks geometrically.
pub fn simple8_first_interval(failures: i32) -> f64 {
    2.4849 * (-0.057 * failures as f64).exp()
}

/// Ease (SM8 "AF") implied by a mean quality in 0..=5.
pub fn simple8_quality_to_ease(mean_quality: f64) -> f64 {
    0.0542 * mean_quality.powi(4) - 0.4848 * mean_quality.powi(3)
        + 1.4916 * mean_quality.powi(2)
        - 1.2403 * mean_quality
        + 1.4515
}

/// Multiplier for the last interval. Tends to `ease` as `repetition` grows,
/// more slowly the smaller `learn_fraction` is.
pub fn simple8_interval_factor(ease: f64, repetition: f64, learn_fraction: f64) -> f64 {
    MIN_FACTOR + (ease - MIN_FACTOR) * learn_fraction.powf(repetition.log2())
}

/// Simple8: interval growth driven by the item's mean quality rather than a
/// per-item easiness, which is carried through untouched.
pub fn simple8(
    state: &ItemState,
    quality: Quality,
    delta_days: Option<i64>,
    config: &DrillConfig,
    rng: &mut dyn RngCore,
) -> Result<ItemState> {
    if state.repetitions < 0 {
        return Err(DrillError::InvalidState(format!(
            "repeats must be >= 0, got {}",
            state.repetitions
        )));
    }
    state.validate()?;

    let repeats = state.repetitions;
    let last_interval = state.last_interval;
    let mean = running_mean(state.mean_quality, state.total_repeats, quality);

    let mut next = state.clone();
    next.mean_quality = Some(mean);
    next.total_repeats = state.total_repeats + 1;

    if quality.is_failure(config.failure_quality_threshold) {
        next.failures = state.failures + 1;
        next.repetitions = 1;
        next.last_interval = UNSCHEDULED;
        return Ok(next);
    }

    let interval = if repeats == 0 || last_interval <= 0.0 {
        next.repetitions = if last_interval < 0.0 { 1 } else { repeats + 1 };
        simple8_first_interval(state.failures)
    } else {
        let adjust = config.adjust_for_early_late;
        let effective_repeats = match delta_days {
            Some(late) if adjust && late > 0 => {
                repeats as f64 + (late as f64 / last_interval).min(1.0)
            }
            _ => repeats as f64,
        };
        let ease = simple8_quality_to_ease(mean);
        let mut factor = simple8_interval_factor(ease, effective_repeats, config.learn_fraction);
        if let Some(early) = delta_days.filter(|d| adjust && *d < 0) {
            let on_time_interval = last_interval * factor;
            factor = early_interval_factor(factor, on_time_interval, early.unsigned_abs() as f64);
        }
        next.repetitions = repeats + 1;
        last_interval * factor
    };

    next.last_interval = if config.add_random_noise && interval > 0.0 {
        interval * dispersal_factor(rng)
    } else {
        interval
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmKind;
    use crate::srs::tests::{q, quiet_config};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(state: &ItemState, rating: i32, delta_days: Option<i64>) -> ItemState {
        let mut rng = StdRng::seed_from_u64(8);
        simple8(state, q(rating), delta_days, &quiet_config(AlgorithmKind::Simple8), &mut rng)
            .unwrap()
    }

    #[test]
    fn first_interval_shrinks_with_failures() {
        assert!((simple8_first_interval(0) - 2.4849).abs() < 1e-12);
        assert!((simple8_first_interval(1) - 2.3472).abs() < 1e-4);
        let mut previous = simple8_first_interval(0);
        for failures in 1..20 {
            let current = simple8_first_interval(failures);
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn ease_rises_with_mean_quality() {
        assert!(simple8_quality_to_ease(3.0) < simple8_quality_to_ease(4.0));
        assert!(simple8_quality_to_ease(4.0) < simple8_quality_to_ease(5.0));
    }

    #[test]
    fn factor_approaches_ease() {
        let ease = 2.8;
        assert!((simple8_interval_factor(ease, 1.0, 0.5) - ease).abs() < 1e-12);
        let f2 = simple8_interval_factor(ease, 2.0, 0.5);
        let f8 = simple8_interval_factor(ease, 8.0, 0.5);
        assert!((f2 - 2.0).abs() < 1e-12);
        assert!(f8 < f2 && f8 > MIN_FACTOR);
    }

    #[test]
    fn fresh_item_uses_first_interval() {
        let state = ItemState {
            failures: 1,
            ..ItemState::new()
        };
        let next = run(&state, 4, None);
        assert!((next.last_interval - 2.4849 * (-0.057f64).exp()).abs() < 1e-9);
        assert_eq!(next.repetitions, 1);
        assert_eq!(next.total_repeats, 1);
    }

    #[test]
    fn recovers_after_failure_with_first_interval() {
        let state = ItemState {
            last_interval: 20.0,
            repetitions: 5,
            failures: 2,
            total_repeats: 7,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let failed = run(&state, 1, None);
        assert_eq!(failed.last_interval, -1.0);
        assert_eq!(failed.repetitions, 1);
        assert_eq!(failed.failures, 3);

        let recovered = run(&failed, 4, None);
        assert!((recovered.last_interval - simple8_first_interval(3)).abs() < 1e-9);
        assert_eq!(recovered.repetitions, 1);
    }

    #[test]
    fn later_reviews_scale_last_interval() {
        let state = ItemState {
            last_interval: 2.4849,
            repetitions: 1,
            total_repeats: 1,
            mean_quality: Some(4.0),
            easiness: Some(2.5),
            ..ItemState::new()
        };
        let next = run(&state, 4, None);
        let ease = simple8_quality_to_ease(4.0);
        assert!((next.last_interval - 2.4849 * ease).abs() < 1e-9);
        assert_eq!(next.repetitions, 2);
        assert_eq!(next.easiness, Some(2.5));
    }

    #[test]
    fn late_review_counts_extra_repeats() {
        let state = ItemState {
            last_interval: 10.0,
            repetitions: 2,
            total_repeats: 3,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let on_time = run(&state, 4, Some(0));
        let late = run(&state, 4, Some(5));
        // more effective repeats means a factor closer to 1.2
        assert!(late.last_interval < on_time.last_interval);
    }

    #[test]
    fn early_review_shortens_interval() {
        let state = ItemState {
            last_interval: 10.0,
            repetitions: 2,
            total_repeats: 3,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let on_time = run(&state, 4, None);
        let early = run(&state, 4, Some(-4));
        assert!(early.last_interval < on_time.last_interval);
        assert!(early.last_interval >= 10.0);
    }

    #[test]
    fn rejects_out_of_range_mean() {
        let state = ItemState {
            mean_quality: Some(-0.5),
            ..ItemState::new()
        };
        let mut rng = StdRng::seed_from_u64(8);
        let err = simple8(&state, q(3), None, &quiet_config(AlgorithmKind::Simple8), &mut rng);
        assert!(matches!(err, Err(DrillError::InvalidState(_))));
    }
}
