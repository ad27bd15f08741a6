use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DrillError, Result};
use crate::srs::round_float;

/// Easiness assumed for items that have never stored one.
pub const DEFAULT_EASINESS: f64 = 2.5;

/// Interval sentinel meaning "not yet scheduled, due immediately".
pub const UNSCHEDULED: f64 = -1.0;

/// Furthest due date a review can set. Stored dates keep a four digit year.
fn latest_due_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// A learner's 0-5 self assessment of recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i32) -> Result<Self> {
        if (0..=5).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DrillError::InvalidQuality(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    /// Ratings at or below the threshold count as a failed recall.
    pub fn is_failure(self, threshold: u8) -> bool {
        self.0 <= threshold
    }
}

impl TryFrom<i32> for Quality {
    type Error = DrillError;

    fn try_from(value: i32) -> Result<Self> {
        Quality::new(value)
    }
}

impl From<Quality> for i32 {
    fn from(q: Quality) -> i32 {
        q.0 as i32
    }
}

/// Scheduling record for one learning item.
///
/// The host owns these and hands them to the core by reference; every review
/// produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    /// Days between the last two reviews, or [`UNSCHEDULED`].
    #[serde(default = "default_last_interval")]
    pub last_interval: f64,
    /// Successful repetitions since the last failure.
    #[serde(default)]
    pub repetitions: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easiness: Option<f64>,
    /// Lifetime failure count. Never decreases.
    #[serde(default)]
    pub failures: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_quality: Option<f64>,
    /// Every rating ever given, pass or fail.
    #[serde(default)]
    pub total_repeats: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

fn default_last_interval() -> f64 {
    UNSCHEDULED
}

impl Default for ItemState {
    fn default() -> Self {
        Self {
            last_interval: UNSCHEDULED,
            repetitions: 0,
            easiness: None,
            failures: 0,
            mean_quality: None,
            total_repeats: 0,
            last_quality: None,
            last_reviewed: None,
            due_date: None,
        }
    }
}

impl ItemState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self) -> bool {
        self.total_repeats == 0
    }

    /// Stored easiness, or the 2.5 default when absent.
    pub fn easiness_or_default(&self) -> f64 {
        self.easiness.unwrap_or(DEFAULT_EASINESS)
    }

    /// Rejects counters and means a review cannot sensibly start from.
    pub fn validate(&self) -> Result<()> {
        if self.repetitions < 0 {
            return Err(DrillError::InvalidState(format!(
                "repetitions must be >= 0, got {}",
                self.repetitions
            )));
        }
        if self.failures < 0 {
            return Err(DrillError::InvalidState(format!(
                "failure count must be >= 0, got {}",
                self.failures
            )));
        }
        if self.total_repeats < 0 {
            return Err(DrillError::InvalidState(format!(
                "total repeats must be >= 0, got {}",
                self.total_repeats
            )));
        }
        if let Some(mean) = self.mean_quality {
            if !(0.0..=5.0).contains(&mean) {
                return Err(DrillError::InvalidState(format!(
                    "mean quality {} is outside 0..=5",
                    mean
                )));
            }
        }
        if !self.last_interval.is_finite() {
            return Err(DrillError::InvalidState("last interval is not finite".into()));
        }
        if let Some(ef) = self.easiness {
            if !ef.is_finite() {
                return Err(DrillError::InvalidState("easiness is not finite".into()));
            }
        }
        Ok(())
    }

    /// Signed days between today and the scheduled date. Unscheduled items
    /// count as due today.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        self.due_date
            .map(|due| (today - due).num_days())
            .unwrap_or(0)
    }

    /// Hours since the item was last rated, if it ever was.
    pub fn hours_since_review(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_reviewed
            .map(|at| (now - at).num_seconds() as f64 / 3600.0)
    }

    /// Stamps a freshly computed state with the bookkeeping a committed
    /// review carries: rounded interval, quality, timestamp and next due date.
    pub fn record_review(mut self, quality: Quality, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        self.last_interval = round_float(self.last_interval, 4);
        self.last_quality = Some(quality.value());
        self.last_reviewed = Some(now);
        self.due_date = Some(if self.last_interval < 0.0 {
            today
        } else {
            let latest = latest_due_date();
            // The float to int cast saturates, so huge intervals land on `latest`.
            today
                .checked_add_days(Days::new(self.last_interval.round() as u64))
                .map_or(latest, |due| due.min(latest))
        });
        self
    }
}

/// A host item paired with its scheduling record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillItem {
    pub id: String,
    pub state: ItemState,
}

impl DrillItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ItemState::new(),
        }
    }
}

/// Where an item stands relative to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DueStatus {
    /// Never reviewed.
    New,
    /// Last rating was a failure.
    Failed,
    Overdue,
    YoungMature,
    OldMature,
    /// Scheduled in the future (or too recent in cram mode).
    NotDue,
}

impl DueStatus {
    pub fn is_due(self) -> bool {
        !matches!(self, DueStatus::NotDue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub status: DueStatus,
    pub leech: bool,
}
