//! Buckets items by where they stand relative to their schedule.

use chrono::{DateTime, Utc};

use crate::config::DrillConfig;
use crate::models::{Classification, DueStatus, ItemState};

/// Classifies one item as of `now`; "today" is the UTC date of `now`.
///
/// In cram mode due-ness depends only on the hours since the last review,
/// and nothing is ever overdue.
pub fn classify(
    state: &ItemState,
    now: DateTime<Utc>,
    cram_mode: bool,
    config: &DrillConfig,
) -> Classification {
    Classification {
        status: due_status(state, now, cram_mode, config),
        leech: is_leech(state, config),
    }
}

pub fn is_leech(state: &ItemState, config: &DrillConfig) -> bool {
    config
        .leech_threshold
        .map_or(false, |threshold| state.failures > threshold)
}

fn due_status(
    state: &ItemState,
    now: DateTime<Utc>,
    cram_mode: bool,
    config: &DrillConfig,
) -> DueStatus {
    if state.is_new() {
        return DueStatus::New;
    }

    if cram_mode {
        let due = state
            .hours_since_review(now)
            .map_or(true, |hours| hours >= config.cram_hours as f64);
        if !due {
            return DueStatus::NotDue;
        }
        if last_rating_failed(state, config) {
            return DueStatus::Failed;
        }
        return maturity(state, config);
    }

    let days_overdue = state.days_overdue(now.date_naive());
    if days_overdue < 0 {
        return DueStatus::NotDue;
    }
    // A failure last time outranks overdue and maturity.
    if last_rating_failed(state, config) {
        return DueStatus::Failed;
    }
    let grace = state.last_interval * (config.overdue_interval_factor - 1.0);
    if state.last_interval > 0.0 && days_overdue as f64 > grace {
        return DueStatus::Overdue;
    }
    maturity(state, config)
}

fn last_rating_failed(state: &ItemState, config: &DrillConfig) -> bool {
    state
        .last_quality
        .map_or(false, |q| q <= config.failure_quality_threshold)
}

fn maturity(state: &ItemState, config: &DrillConfig) -> DueStatus {
    if state.last_interval <= config.days_before_old as f64 {
        DueStatus::YoungMature
    } else {
        DueStatus::OldMature
    }
}
