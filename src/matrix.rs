//! SM5 optimal factor matrix.
//!
//! Sparse table of `(repetition, easiness) -> optimal factor`. Entries are
//! added or overwritten one at a time as items are reviewed and are never
//! removed. The host loads it before a session and saves it afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::srs::round_float;

/// Easiness rounded to 3 decimals, held as thousandths so it can key a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EasinessKey(i64);

impl EasinessKey {
    pub fn from_easiness(ef: f64) -> Self {
        Self((round_float(ef, 3) * 1000.0).round() as i64)
    }

    pub fn from_thousandths(raw: i64) -> Self {
        Self(raw)
    }

    pub fn thousandths(self) -> i64 {
        self.0
    }

    pub fn easiness(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// A single write produced by an SM5 review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorUpdate {
    pub repetition: i32,
    pub easiness: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalFactorMatrix {
    rows: BTreeMap<i32, BTreeMap<EasinessKey, f64>>,
}

impl OptimalFactorMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored factor for `(n, ef)`, if one has been learned.
    pub fn get(&self, n: i32, ef: f64) -> Option<f64> {
        self.rows
            .get(&n)
            .and_then(|row| row.get(&EasinessKey::from_easiness(ef)))
            .copied()
    }

    /// Stored factor, or the default: `initial_interval` for the first
    /// repetition and the easiness itself otherwise.
    pub fn lookup(&self, n: i32, ef: f64, initial_interval: f64) -> f64 {
        self.get(n, ef)
            .unwrap_or(if n == 1 { initial_interval } else { ef })
    }

    pub fn set(&mut self, n: i32, ef: f64, factor: f64) {
        self.rows
            .entry(n)
            .or_default()
            .insert(EasinessKey::from_easiness(ef), factor);
    }

    pub fn apply(&mut self, update: &FactorUpdate) {
        self.set(update.repetition, update.easiness, update.factor);
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in `(n, easiness key, factor)` order.
    pub fn entries(&self) -> impl Iterator<Item = (i32, EasinessKey, f64)> + '_ {
        self.rows
            .iter()
            .flat_map(|(n, row)| row.iter().map(move |(key, of)| (*n, *key, *of)))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, EasinessKey, f64)>,
    {
        let mut matrix = Self::new();
        for (n, key, of) in entries {
            matrix.rows.entry(n).or_default().insert(key, of);
        }
        matrix
    }
}
