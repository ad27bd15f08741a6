use rand::RngCore;

use super::{dispersal_factor, next_easiness, running_mean};
use crate::config::DrillConfig;
use crate::error::Result;
use crate::models::{ItemState, Quality, UNSCHEDULED};

/// SuperMemo 2.
///
/// Intervals run 1 day, then 6 days, then grow by the easiness factor. On
/// failure the easiness is left untouched.
pub fn sm2(
    state: &ItemState,
    quality: Quality,
    config: &DrillConfig,
    rng: &mut dyn RngCore,
) -> Result<ItemState> {
    state.validate()?;
    let n = state.repetitions.max(1);
    let ef = state.easiness_or_default();
    let mean = running_mean(state.mean_quality, state.total_repeats, quality);

    let mut next = state.clone();
    next.mean_quality = Some(mean);
    next.total_repeats = state.total_repeats + 1;

    if quality.is_failure(config.failure_quality_threshold) {
        next.last_interval = UNSCHEDULED;
        next.repetitions = 1;
        next.easiness = Some(ef);
        next.failures = state.failures + 1;
        return Ok(next);
    }

    let next_ef = next_easiness(ef, quality);
    let interval = if n <= 1 {
        1.0
    } else if n == 2 {
        if config.add_random_noise {
            match quality.value() {
                5 => 6.0,
                4 => 4.0,
                3 => 3.0,
                2 => 1.0,
                _ => UNSCHEDULED,
            }
        } else {
            6.0
        }
    } else {
        state.last_interval * next_ef
    };

    // Interpolate from the previous interval so the spread grows with the
    // size of the step. Only growing steps are spread, so a success never
    // lands on or below zero.
    let base = state.last_interval.max(0.0);
    next.last_interval = if config.add_random_noise && interval > base {
        base + (interval - base) * dispersal_factor(rng)
    } else {
        interval
    };
    next.repetitions = n + 1;
    next.easiness = Some(next_ef);
    Ok(next)
}
