//! Interval scheduling algorithms.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout
//! - 1: Incorrect, but the answer was recognised
//! - 2: Incorrect, but the answer seemed easy to recall
//! - 3: Correct with serious difficulty
//! - 4: Correct after hesitation
//! - 5: Perfect response
//!
//! Ratings at or below the configured failure threshold reset the item for
//! every algorithm: interval becomes the unscheduled sentinel, repetitions
//! drop to 1 and the failure count goes up.

mod simple8;
mod sm2;
mod sm5;

pub use simple8::{simple8, simple8_first_interval, simple8_interval_factor, simple8_quality_to_ease};
pub use sm2::sm2;
pub use sm5::{modify_optimal_factor, sm5};

use log::debug;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::{AlgorithmKind, DrillConfig};
use crate::error::Result;
use crate::matrix::{FactorUpdate, OptimalFactorMatrix};
use crate::models::{ItemState, Quality};

/// Easiness never drops below this.
pub const MIN_EASINESS: f64 = 1.3;

/// Rounds half away from zero at `places` decimals.
pub fn round_float(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// SM-2 easiness update:
/// EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), floored at 1.3.
pub fn next_easiness(ef: f64, quality: Quality) -> f64 {
    let ef = ef.max(MIN_EASINESS);
    let q = 5.0 - quality.as_f64();
    (ef + (0.1 - q * (0.08 + q * 0.02))).max(MIN_EASINESS)
}

/// Mean quality after folding in one more rating. `total_repeats` is the
/// count before this rating.
pub fn running_mean(previous: Option<f64>, total_repeats: i32, quality: Quality) -> f64 {
    match previous {
        Some(mean) => {
            (quality.as_f64() + mean * total_repeats as f64) / (total_repeats as f64 + 1.0)
        }
        None => quality.as_f64(),
    }
}

/// Random multiplier, roughly 0.58..=1.42, clustered around 1.0.
pub fn dispersal_factor<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let a = 0.047;
    let b = 0.092;
    let p: f64 = rng.gen::<f64>() - 0.5;
    let sign = if p > 0.0 {
        1.0
    } else if p < 0.0 {
        -1.0
    } else {
        0.0
    };
    (100.0 + (-1.0 / b) * (1.0 - (b / a) * p.abs()).ln() * sign) / 100.0
}

/// Interval factor for a repetition done `days_early` days ahead of
/// schedule, given the factor and interval the on-time repetition would
/// have used. The result never shrinks an interval.
pub fn early_interval_factor(optimal_factor: f64, optimal_interval: f64, days_early: f64) -> f64 {
    if optimal_interval <= 1.0 || days_early <= 0.0 {
        return optimal_factor;
    }
    let delta_max = (optimal_factor - 1.0)
        * ((optimal_interval + 0.6 * optimal_interval - 1.0) / (optimal_interval - 1.0));
    let factor = optimal_factor - delta_max * (days_early / (days_early + 0.6 * optimal_interval));
    factor.max(1.0)
}

/// Outcome of one rating, before the host commits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub state: ItemState,
    /// Present for SM5 only.
    pub factor_update: Option<FactorUpdate>,
}

/// Dispatches ratings to the configured algorithm.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: DrillConfig,
}

impl Scheduler {
    pub fn new(config: DrillConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DrillConfig {
        &self.config
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.config.algorithm
    }

    /// Computes the next state without touching the matrix.
    pub fn review(
        &self,
        state: &ItemState,
        quality: i32,
        delta_days: Option<i64>,
        matrix: &OptimalFactorMatrix,
        rng: &mut dyn RngCore,
    ) -> Result<Review> {
        let quality = Quality::new(quality)?;
        state.validate()?;
        let delta_days = if self.config.adjust_for_early_late {
            delta_days
        } else {
            None
        };

        let review = match self.config.algorithm {
            AlgorithmKind::Sm2 => Review {
                state: sm2(state, quality, &self.config, rng)?,
                factor_update: None,
            },
            AlgorithmKind::Sm5 => {
                let (state, update) = sm5(state, quality, delta_days, matrix, &self.config, rng)?;
                Review {
                    state,
                    factor_update: Some(update),
                }
            }
            AlgorithmKind::Simple8 => Review {
                state: simple8(state, quality, delta_days, &self.config, rng)?,
                factor_update: None,
            },
        };

        debug!(
            "{:?} q={} n={} -> interval={:.3} n={} ef={:?}",
            self.config.algorithm,
            quality.value(),
            state.repetitions,
            review.state.last_interval,
            review.state.repetitions,
            review.state.easiness
        );
        Ok(review)
    }

    /// Computes the next state and writes any optimal factor update into
    /// `matrix`. This is the only place the matrix changes.
    pub fn schedule_next(
        &self,
        state: &ItemState,
        quality: i32,
        delta_days: Option<i64>,
        matrix: &mut OptimalFactorMatrix,
        rng: &mut dyn RngCore,
    ) -> Result<ItemState> {
        let review = self.review(state, quality, delta_days, matrix, rng)?;
        if let Some(update) = &review.factor_update {
            matrix.apply(update);
        }
        Ok(review.state)
    }

    /// Noise-free interval each quality 0..=5 would produce, for display.
    pub fn preview(&self, state: &ItemState, matrix: &OptimalFactorMatrix) -> Result<[f64; 6]> {
        let quiet = Scheduler {
            config: DrillConfig {
                add_random_noise: false,
                ..self.config.clone()
            },
        };
        let mut rng = rand::thread_rng();
        let mut intervals = [0.0; 6];
        for (q, slot) in intervals.iter_mut().enumerate() {
            *slot = quiet
                .review(state, q as i32, None, matrix, &mut rng)?
                .state
                .last_interval;
        }
        Ok(intervals)
    }
}

/// Formats an interval in days as a short label.
pub fn format_interval(days: f64) -> String {
    let days = days.round() as i64;
    if days <= 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn quiet_config(kind: AlgorithmKind) -> DrillConfig {
        DrillConfig {
            algorithm: kind,
            add_random_noise: false,
            ..DrillConfig::default()
        }
    }

    pub(crate) fn q(value: i32) -> Quality {
        Quality::new(value).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_float(3.56755765, 3), 3.568);
        assert_eq!(round_float(2.5, 0), 3.0);
        assert_eq!(round_float(-2.5, 0), -3.0);
        assert_eq!(round_float(1.2344, 3), 1.234);
    }

    #[test]
    fn easiness_update_follows_quality() {
        assert!((next_easiness(2.5, q(5)) - 2.6).abs() < 1e-9);
        assert!((next_easiness(2.5, q(4)) - 2.5).abs() < 1e-9);
        assert!((next_easiness(2.5, q(3)) - 2.36).abs() < 1e-9);
        assert_eq!(next_easiness(1.3, q(0)), MIN_EASINESS);
    }

    #[test]
    fn easiness_never_drops_below_floor() {
        let mut ef = 2.5;
        for rating in [3, 0, 1, 3, 2, 0, 3, 3, 5, 0, 3] {
            ef = next_easiness(ef, q(rating));
            assert!(ef >= MIN_EASINESS);
        }
    }

    #[test]
    fn dispersal_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..2000 {
            let f = dispersal_factor(&mut rng);
            assert!(f > 0.5 && f < 1.5, "factor {} out of band", f);
        }
    }

    #[test]
    fn early_factor_pulls_toward_one() {
        let on_time = early_interval_factor(2.5, 10.0, 0.0);
        let early = early_interval_factor(2.5, 10.0, 3.0);
        let very_early = early_interval_factor(2.5, 10.0, 8.0);
        assert_eq!(on_time, 2.5);
        assert!(early < on_time);
        assert!(very_early < early);
        assert!(very_early >= 1.0);
        assert_eq!(early_interval_factor(2.5, 1.0, 3.0), 2.5);
    }

    #[test]
    fn rejects_invalid_quality_and_state() {
        let scheduler = Scheduler::new(quiet_config(AlgorithmKind::Sm2)).unwrap();
        let mut matrix = OptimalFactorMatrix::new();
        let mut rng = StdRng::seed_from_u64(1);

        let err = scheduler.schedule_next(&ItemState::new(), 6, None, &mut matrix, &mut rng);
        assert_eq!(err, Err(crate::DrillError::InvalidQuality(6)));

        let bad = ItemState {
            failures: -2,
            ..ItemState::new()
        };
        let err = scheduler.schedule_next(&bad, 4, None, &mut matrix, &mut rng);
        assert!(matches!(err, Err(crate::DrillError::InvalidState(_))));
    }

    #[test]
    fn failure_resets_for_every_algorithm() {
        let prior = ItemState {
            last_interval: 12.0,
            repetitions: 4,
            easiness: Some(2.2),
            failures: 3,
            mean_quality: Some(3.5),
            total_repeats: 8,
            ..ItemState::new()
        };
        for kind in [AlgorithmKind::Sm2, AlgorithmKind::Sm5, AlgorithmKind::Simple8] {
            let scheduler = Scheduler::new(DrillConfig {
                algorithm: kind,
                ..DrillConfig::default()
            })
            .unwrap();
            let mut matrix = OptimalFactorMatrix::new();
            let mut rng = StdRng::seed_from_u64(3);
            for rating in 0..=2 {
                let next = scheduler
                    .schedule_next(&prior, rating, Some(2), &mut matrix, &mut rng)
                    .unwrap();
                assert_eq!(next.last_interval, -1.0, "{:?}", kind);
                assert_eq!(next.repetitions, 1, "{:?}", kind);
                assert_eq!(next.failures, prior.failures + 1, "{:?}", kind);
                assert_eq!(next.total_repeats, prior.total_repeats + 1, "{:?}", kind);
            }
        }
    }

    #[test]
    fn mean_quality_is_arithmetic_mean() {
        let ratings = [5, 3, 0, 4, 4, 2, 5, 1, 3];
        for kind in [AlgorithmKind::Sm2, AlgorithmKind::Sm5, AlgorithmKind::Simple8] {
            let scheduler = Scheduler::new(quiet_config(kind)).unwrap();
            let mut matrix = OptimalFactorMatrix::new();
            let mut rng = StdRng::seed_from_u64(5);
            let mut state = ItemState::new();
            for (i, rating) in ratings.iter().enumerate() {
                state = scheduler
                    .schedule_next(&state, *rating, None, &mut matrix, &mut rng)
                    .unwrap();
                let expected: f64 =
                    ratings[..=i].iter().map(|r| *r as f64).sum::<f64>() / (i + 1) as f64;
                let mean = state.mean_quality.unwrap();
                assert!((mean - expected).abs() < 1e-9, "{:?} step {}", kind, i);
                assert_eq!(state.total_repeats, i as i32 + 1);
            }
        }
    }

    #[test]
    fn only_sm5_writes_the_matrix() {
        let mut rng = StdRng::seed_from_u64(9);
        for kind in [AlgorithmKind::Sm2, AlgorithmKind::Simple8] {
            let scheduler = Scheduler::new(quiet_config(kind)).unwrap();
            let mut matrix = OptimalFactorMatrix::new();
            scheduler
                .schedule_next(&ItemState::new(), 5, None, &mut matrix, &mut rng)
                .unwrap();
            assert!(matrix.is_empty());
        }

        let scheduler = Scheduler::new(quiet_config(AlgorithmKind::Sm5)).unwrap();
        let mut matrix = OptimalFactorMatrix::new();
        scheduler
            .schedule_next(&ItemState::new(), 5, None, &mut matrix, &mut rng)
            .unwrap();
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn early_late_adjustment_can_be_switched_off() {
        let state = ItemState {
            last_interval: 10.0,
            repetitions: 3,
            easiness: Some(2.5),
            total_repeats: 3,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let scheduler = |kind, adjust| {
            Scheduler::new(DrillConfig {
                adjust_for_early_late: adjust,
                ..quiet_config(kind)
            })
            .unwrap()
        };
        let mut rng = StdRng::seed_from_u64(4);

        // SM5 reviewed five days early: only the adjusted run overrides the nudge.
        let plain = round_float(
            modify_optimal_factor(2.5, q(3), DrillConfig::default().learn_fraction),
            3,
        );
        let mut off = OptimalFactorMatrix::new();
        scheduler(AlgorithmKind::Sm5, false)
            .schedule_next(&state, 3, Some(-5), &mut off, &mut rng)
            .unwrap();
        assert_eq!(off.get(3, 2.36), Some(plain));

        let mut on = OptimalFactorMatrix::new();
        scheduler(AlgorithmKind::Sm5, true)
            .schedule_next(&state, 3, Some(-5), &mut on, &mut rng)
            .unwrap();
        let adjusted = on.get(3, 2.36).unwrap();
        assert!(adjusted < plain, "{} vs {}", adjusted, plain);

        // Simple8 ignores both lateness and earliness.
        let off = scheduler(AlgorithmKind::Simple8, false);
        let on = scheduler(AlgorithmKind::Simple8, true);
        let mut matrix = OptimalFactorMatrix::new();
        let on_time = off
            .schedule_next(&state, 4, None, &mut matrix, &mut rng)
            .unwrap();
        for delta in [7, -5] {
            let ignored = off
                .schedule_next(&state, 4, Some(delta), &mut matrix, &mut rng)
                .unwrap();
            assert_eq!(ignored, on_time, "delta {}", delta);
            let adjusted = on
                .schedule_next(&state, 4, Some(delta), &mut matrix, &mut rng)
                .unwrap();
            assert_ne!(adjusted.last_interval, on_time.last_interval, "delta {}", delta);
        }
    }

    #[test]
    fn long_success_streak_never_panics() {
        let scheduler = Scheduler::new(quiet_config(AlgorithmKind::Sm2)).unwrap();
        let mut matrix = OptimalFactorMatrix::new();
        let mut rng = StdRng::seed_from_u64(6);
        let now = chrono::Utc::now();
        let mut state = ItemState::new();
        for _ in 0..40 {
            state = scheduler
                .schedule_next(&state, 5, None, &mut matrix, &mut rng)
                .unwrap()
                .record_review(q(5), now);
        }
        assert!(state.last_interval > 1.0e8);
        assert_eq!(state.due_date, chrono::NaiveDate::from_ymd_opt(9999, 12, 31));
    }

    #[test]
    fn preview_leaves_matrix_alone() {
        let scheduler = Scheduler::new(DrillConfig::default()).unwrap();
        let matrix = OptimalFactorMatrix::new();
        let state = ItemState {
            last_interval: 4.0,
            repetitions: 2,
            easiness: Some(2.5),
            total_repeats: 1,
            mean_quality: Some(4.0),
            ..ItemState::new()
        };
        let intervals = scheduler.preview(&state, &matrix).unwrap();
        assert_eq!(intervals[0], -1.0);
        assert_eq!(intervals[2], -1.0);
        assert!(intervals[5] >= intervals[3]);
        assert!(matrix.is_empty());
    }

    #[test]
    fn formats_intervals() {
        assert_eq!(format_interval(-1.0), "now");
        assert_eq!(format_interval(1.2), "1d");
        assert_eq!(format_interval(14.0), "2w");
        assert_eq!(format_interval(90.0), "3mo");
        assert_eq!(format_interval(800.0), "2y");
    }
}
