//! One drill session: picks the next item, takes a rating, repeats.
//!
//! The session never blocks. The host calls [`DrillSession::next_item`],
//! asks the learner for a rating however it likes, then hands the rating to
//! [`DrillSession::rate`]. Each rating is committed in full before the call
//! returns; quitting only drops the item still awaiting a rating.
//!
//! Hosts that persist ratings split `rate` in two: [`DrillSession::score`]
//! computes the new state without changing the session, the host stores
//! it, and [`DrillSession::commit`] applies it. A failed store leaves the
//! item in flight.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::classify::classify;
use crate::config::{DrillConfig, LeechMethod};
use crate::error::{DrillError, Result};
use crate::matrix::{FactorUpdate, OptimalFactorMatrix};
use crate::models::{DrillItem, DueStatus, Quality};
use crate::srs::Scheduler;

/// Queue an item is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Failed in an earlier session.
    Failed,
    Overdue,
    YoungMature,
    New,
    OldMature,
    /// Failed earlier in this session.
    Again,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    LimitReached,
    TimeUp,
    Exhausted,
    Quit,
}

/// The item the learner should be shown next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub item: DrillItem,
    pub category: Category,
    pub leech_warning: bool,
}

/// A committed rating. `item` carries the state the host should persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedItem {
    pub item: DrillItem,
    pub quality: u8,
    pub failed: bool,
}

/// A rating scheduled against the in-flight item but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRating {
    item: DrillItem,
    quality: Quality,
    factor_update: Option<FactorUpdate>,
}

impl ScoredRating {
    /// The item with the state it will have once committed.
    pub fn item(&self) -> &DrillItem {
        &self.item
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub failed: usize,
    pub overdue: usize,
    pub young_mature: usize,
    pub new: usize,
    pub old_mature: usize,
    pub again: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.failed + self.overdue + self.young_mature + self.new + self.old_mature + self.again
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub end_reason: EndReason,
    /// Every rating given, including repeat ratings of the same item.
    pub reviewed: usize,
    pub failed: usize,
    pub percent_forgotten: f64,
    pub forgetting_index_exceeded: bool,
    /// Count of ratings 0..=5.
    pub quality_counts: [usize; 6],
    pub pending: PendingCounts,
    pub skipped_leeches: usize,
    /// Stored records that failed validation and were left out.
    pub skipped_invalid: usize,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone)]
struct Pending {
    item: DrillItem,
    category: Category,
    leech: bool,
}

pub struct DrillSession {
    scheduler: Scheduler,
    cram_mode: bool,
    started_at: DateTime<Utc>,
    failed: Vec<Pending>,
    overdue: VecDeque<Pending>,
    young_mature: Vec<Pending>,
    new: Vec<Pending>,
    old_mature: Vec<Pending>,
    again: VecDeque<Pending>,
    in_flight: Option<Pending>,
    reviewed: usize,
    failed_count: usize,
    quality_counts: [usize; 6],
    skipped_leeches: usize,
    skipped_invalid: usize,
    end_reason: Option<EndReason>,
    rng: StdRng,
}

impl DrillSession {
    pub fn new(
        config: DrillConfig,
        items: Vec<DrillItem>,
        now: DateTime<Utc>,
        cram_mode: bool,
    ) -> Result<Self> {
        Self::with_rng(config, items, now, cram_mode, StdRng::from_entropy())
    }

    /// Like [`DrillSession::new`] with a caller-supplied random source.
    pub fn with_rng(
        config: DrillConfig,
        items: Vec<DrillItem>,
        now: DateTime<Utc>,
        cram_mode: bool,
        mut rng: StdRng,
    ) -> Result<Self> {
        let scheduler = Scheduler::new(config)?;
        let config = scheduler.config();
        let today = now.date_naive();

        let mut failed = Vec::new();
        let mut overdue = Vec::new();
        let mut young_mature = Vec::new();
        let mut new = Vec::new();
        let mut old_mature = Vec::new();
        let mut skipped_leeches = 0;
        let mut skipped_invalid = 0;

        for item in items {
            if let Err(err) = item.state.validate() {
                warn!("skipping item {}: {}", item.id, err);
                skipped_invalid += 1;
                continue;
            }
            let class = classify(&item.state, now, cram_mode, config);
            if !class.status.is_due() {
                continue;
            }
            if class.leech && config.leech_method == LeechMethod::Skip {
                skipped_leeches += 1;
                continue;
            }
            let category = match class.status {
                DueStatus::Failed => Category::Failed,
                DueStatus::Overdue => Category::Overdue,
                DueStatus::YoungMature => Category::YoungMature,
                DueStatus::New => Category::New,
                DueStatus::OldMature => Category::OldMature,
                DueStatus::NotDue => continue,
            };
            let leech = class.leech && config.leech_method == LeechMethod::Warn;
            let pending = Pending {
                item,
                category,
                leech,
            };
            match category {
                Category::Failed => failed.push(pending),
                Category::Overdue => overdue.push(pending),
                Category::YoungMature => young_mature.push(pending),
                Category::New => new.push(pending),
                Category::OldMature => old_mature.push(pending),
                Category::Again => {}
            }
        }

        // Shuffle first so equally late items come out in random order.
        shuffle(&mut overdue, &mut rng);
        overdue.sort_by_key(|p| std::cmp::Reverse(p.item.state.days_overdue(today)));

        let session = Self {
            scheduler,
            cram_mode,
            started_at: now,
            failed,
            overdue: overdue.into(),
            young_mature,
            new,
            old_mature,
            again: VecDeque::new(),
            in_flight: None,
            reviewed: 0,
            failed_count: 0,
            quality_counts: [0; 6],
            skipped_leeches,
            skipped_invalid,
            end_reason: None,
            rng,
        };
        info!(
            "session started ({}): {} items pending, {} leeches skipped",
            if cram_mode { "cram" } else { "normal" },
            session.pending_counts().total(),
            skipped_leeches
        );
        Ok(session)
    }

    pub fn config(&self) -> &DrillConfig {
        self.scheduler.config()
    }

    pub fn is_finished(&self) -> bool {
        self.end_reason.is_some()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            failed: self.failed.len(),
            overdue: self.overdue.len(),
            young_mature: self.young_mature.len(),
            new: self.new.len(),
            old_mature: self.old_mature.len(),
            again: self.again.len(),
        }
    }

    /// Ratings that count toward the item limit.
    pub fn counted_items(&self) -> usize {
        if self.config().count_failed_items_in_limit {
            self.reviewed
        } else {
            self.reviewed - self.failed_count
        }
    }

    /// The item to show next, or `None` once the session is over. Asking
    /// again before rating returns the same item.
    pub fn next_item(&mut self, now: DateTime<Utc>) -> Option<Presentation> {
        if self.end_reason.is_some() {
            return None;
        }
        if let Some(pending) = &self.in_flight {
            return Some(present(pending));
        }
        if let Some(reason) = self.limit_reached(now) {
            self.end(reason);
            return None;
        }

        let Some(pending) = self.pop_next() else {
            self.end(EndReason::Exhausted);
            return None;
        };
        if pending.leech {
            warn!("item {} is a leech ({} failures)", pending.item.id, pending.item.state.failures);
        }
        let presentation = present(&pending);
        self.in_flight = Some(pending);
        Some(presentation)
    }

    /// Rates the item returned by the last `next_item` call and commits
    /// its new state. A failed item is queued again unless the session is
    /// about to end.
    pub fn rate(
        &mut self,
        quality: i32,
        now: DateTime<Utc>,
        matrix: &mut OptimalFactorMatrix,
    ) -> Result<RatedItem> {
        let scored = self.score(quality, now, matrix)?;
        self.commit(scored, now, matrix)
    }

    /// Schedules the in-flight item for `quality`. Neither the session nor
    /// the matrix changes until the result is passed to [`Self::commit`].
    pub fn score(
        &mut self,
        quality: i32,
        now: DateTime<Utc>,
        matrix: &OptimalFactorMatrix,
    ) -> Result<ScoredRating> {
        if self.end_reason.is_some() {
            return Err(DrillError::SessionEnded);
        }
        let rating = Quality::new(quality)?;
        let Some(pending) = &self.in_flight else {
            return Err(DrillError::NoItemInFlight);
        };

        let delta_days = Some(pending.item.state.days_overdue(now.date_naive()));
        let review = self.scheduler.review(
            &pending.item.state,
            quality,
            delta_days,
            matrix,
            &mut self.rng,
        )?;
        Ok(ScoredRating {
            item: DrillItem {
                id: pending.item.id.clone(),
                state: review.state.record_review(rating, now),
            },
            quality: rating,
            factor_update: review.factor_update,
        })
    }

    /// Applies a rating from [`Self::score`]: the item's new state, the
    /// matrix write and the session statistics.
    pub fn commit(
        &mut self,
        scored: ScoredRating,
        now: DateTime<Utc>,
        matrix: &mut OptimalFactorMatrix,
    ) -> Result<RatedItem> {
        if self.end_reason.is_some() {
            return Err(DrillError::SessionEnded);
        }
        let Some(mut pending) = self.in_flight.take() else {
            return Err(DrillError::NoItemInFlight);
        };
        if pending.item.id != scored.item.id {
            self.in_flight = Some(pending);
            return Err(DrillError::NoItemInFlight);
        }

        if let Some(update) = &scored.factor_update {
            matrix.apply(update);
        }
        let rating = scored.quality;
        pending.item = scored.item;

        let failed = rating.is_failure(self.config().failure_quality_threshold);
        self.reviewed += 1;
        self.quality_counts[rating.value() as usize] += 1;
        if failed {
            self.failed_count += 1;
        }

        let rated = RatedItem {
            item: pending.item.clone(),
            quality: rating.value(),
            failed,
        };

        if failed && self.limit_reached(now).is_none() {
            pending.category = Category::Again;
            self.again.push_back(pending);
        }
        Ok(rated)
    }

    /// Ends the session, dropping the item awaiting a rating. Ratings
    /// already given stay committed.
    pub fn quit(&mut self) {
        self.in_flight = None;
        if self.end_reason.is_none() {
            self.end(EndReason::Quit);
        }
    }

    /// Summary statistics. A session still running is reported as quit.
    pub fn finish(mut self, now: DateTime<Utc>) -> SessionReport {
        self.quit();
        self.report(now)
    }

    pub fn report(&self, now: DateTime<Utc>) -> SessionReport {
        let percent_forgotten = self.percent_forgotten();
        SessionReport {
            end_reason: self.end_reason.unwrap_or(EndReason::Quit),
            reviewed: self.reviewed,
            failed: self.failed_count,
            percent_forgotten,
            forgetting_index_exceeded: percent_forgotten > self.config().forgetting_index,
            quality_counts: self.quality_counts,
            pending: self.pending_counts(),
            skipped_leeches: self.skipped_leeches,
            skipped_invalid: self.skipped_invalid,
            elapsed_seconds: (now - self.started_at).num_seconds(),
        }
    }

    fn percent_forgotten(&self) -> f64 {
        if self.reviewed == 0 {
            0.0
        } else {
            self.failed_count as f64 * 100.0 / self.reviewed as f64
        }
    }

    fn end(&mut self, reason: EndReason) {
        info!(
            "session ended ({:?}) after {} reviews, {} failed",
            reason, self.reviewed, self.failed_count
        );
        let percent_forgotten = self.percent_forgotten();
        let forgetting_index = self.config().forgetting_index;
        if percent_forgotten > forgetting_index {
            warn!(
                "forgot {:.1}% of items, above the {:.1}% forgetting index",
                percent_forgotten, forgetting_index
            );
        }
        self.end_reason = Some(reason);
    }

    fn limit_reached(&self, now: DateTime<Utc>) -> Option<EndReason> {
        if self.cram_mode {
            return None;
        }
        let config = self.config();
        if let Some(max) = config.max_items_per_session {
            if self.counted_items() >= max {
                return Some(EndReason::LimitReached);
            }
        }
        if let Some(minutes) = config.max_duration_minutes {
            if now - self.started_at >= Duration::minutes(minutes) {
                return Some(EndReason::TimeUp);
            }
        }
        None
    }

    /// Failed-last-session first, then overdue, young, a random mix of new
    /// and old, and finally items failed during this session.
    fn pop_next(&mut self) -> Option<Pending> {
        if !self.failed.is_empty() {
            return Some(pop_random(&mut self.failed, &mut self.rng));
        }
        if let Some(pending) = self.overdue.pop_front() {
            return Some(pending);
        }
        if !self.young_mature.is_empty() {
            return Some(pop_random(&mut self.young_mature, &mut self.rng));
        }
        let fresh = self.new.len();
        let old = self.old_mature.len();
        if fresh + old > 0 {
            return Some(if self.rng.gen_range(0..fresh + old) < fresh {
                pop_random(&mut self.new, &mut self.rng)
            } else {
                pop_random(&mut self.old_mature, &mut self.rng)
            });
        }
        self.again.pop_front()
    }
}

fn present(pending: &Pending) -> Presentation {
    Presentation {
        item: pending.item.clone(),
        category: pending.category,
        leech_warning: pending.leech,
    }
}

fn pop_random(items: &mut Vec<Pending>, rng: &mut StdRng) -> Pending {
    let index = rng.gen_range(0..items.len());
    items.swap_remove(index)
}

fn shuffle(items: &mut [Pending], rng: &mut StdRng) {
    use rand::seq::SliceRandom;
    items.shuffle(rng);
}
