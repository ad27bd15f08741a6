use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DrillError, Result};

/// Which interval algorithm a session schedules with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Sm2,
    Sm5,
    Simple8,
}

impl FromStr for AlgorithmKind {
    type Err = DrillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sm2" => Ok(Self::Sm2),
            "sm5" => Ok(Self::Sm5),
            "simple8" => Ok(Self::Simple8),
            other => Err(DrillError::InvalidConfig(format!("unknown algorithm '{}'", other))),
        }
    }
}

/// What to do with items failed more often than the leech threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeechMethod {
    None,
    Warn,
    Skip,
}

impl FromStr for LeechMethod {
    type Err = DrillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "warn" => Ok(Self::Warn),
            "skip" => Ok(Self::Skip),
            other => Err(DrillError::InvalidConfig(format!("unknown leech method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillConfig {
    pub algorithm: AlgorithmKind,
    /// Ratings at or below this value are failures. Either 1 or 2.
    pub failure_quality_threshold: u8,
    pub leech_threshold: Option<i32>,
    pub leech_method: LeechMethod,
    /// An item is overdue once it is late by more than
    /// `last_interval * (factor - 1)` days.
    pub overdue_interval_factor: f64,
    pub days_before_old: i32,
    pub learn_fraction: f64,
    pub sm5_initial_interval: f64,
    pub add_random_noise: bool,
    pub adjust_for_early_late: bool,
    pub cram_hours: i64,
    pub max_items_per_session: Option<usize>,
    pub max_duration_minutes: Option<i64>,
    pub count_failed_items_in_limit: bool,
    /// Percentage of forgotten items above which a session warns.
    pub forgetting_index: f64,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Sm5,
            failure_quality_threshold: 2,
            leech_threshold: Some(15),
            leech_method: LeechMethod::Skip,
            overdue_interval_factor: 1.2,
            days_before_old: 10,
            learn_fraction: 0.5,
            sm5_initial_interval: 4.0,
            add_random_noise: true,
            adjust_for_early_late: true,
            cram_hours: 12,
            max_items_per_session: Some(30),
            max_duration_minutes: Some(20),
            count_failed_items_in_limit: true,
            forgetting_index: 10.0,
        }
    }
}

impl DrillConfig {
    /// Builds a config from `DRILL_*` variables, keeping defaults for any
    /// that are unset. Call `dotenvy::dotenv()` first to honour a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`DrillConfig::from_env`] but reads keys through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("DRILL_ALGORITHM") {
            config.algorithm = v.parse()?;
        }
        if let Some(v) = lookup("DRILL_FAILURE_QUALITY") {
            config.failure_quality_threshold = parse_value("DRILL_FAILURE_QUALITY", &v)?;
        }
        if let Some(v) = lookup("DRILL_LEECH_THRESHOLD") {
            config.leech_threshold = parse_optional("DRILL_LEECH_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("DRILL_LEECH_METHOD") {
            config.leech_method = v.parse()?;
        }
        if let Some(v) = lookup("DRILL_OVERDUE_INTERVAL_FACTOR") {
            config.overdue_interval_factor = parse_value("DRILL_OVERDUE_INTERVAL_FACTOR", &v)?;
        }
        if let Some(v) = lookup("DRILL_DAYS_BEFORE_OLD") {
            config.days_before_old = parse_value("DRILL_DAYS_BEFORE_OLD", &v)?;
        }
        if let Some(v) = lookup("DRILL_LEARN_FRACTION") {
            config.learn_fraction = parse_value("DRILL_LEARN_FRACTION", &v)?;
        }
        if let Some(v) = lookup("DRILL_SM5_INITIAL_INTERVAL") {
            config.sm5_initial_interval = parse_value("DRILL_SM5_INITIAL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("DRILL_ADD_RANDOM_NOISE") {
            config.add_random_noise = parse_value("DRILL_ADD_RANDOM_NOISE", &v)?;
        }
        if let Some(v) = lookup("DRILL_ADJUST_FOR_EARLY_LATE") {
            config.adjust_for_early_late = parse_value("DRILL_ADJUST_FOR_EARLY_LATE", &v)?;
        }
        if let Some(v) = lookup("DRILL_CRAM_HOURS") {
            config.cram_hours = parse_value("DRILL_CRAM_HOURS", &v)?;
        }
        if let Some(v) = lookup("DRILL_MAX_ITEMS") {
            config.max_items_per_session = parse_optional("DRILL_MAX_ITEMS", &v)?;
        }
        if let Some(v) = lookup("DRILL_MAX_MINUTES") {
            config.max_duration_minutes = parse_optional("DRILL_MAX_MINUTES", &v)?;
        }
        if let Some(v) = lookup("DRILL_COUNT_FAILED_ITEMS") {
            config.count_failed_items_in_limit = parse_value("DRILL_COUNT_FAILED_ITEMS", &v)?;
        }
        if let Some(v) = lookup("DRILL_FORGETTING_INDEX") {
            config.forgetting_index = parse_value("DRILL_FORGETTING_INDEX", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.failure_quality_threshold, 1 | 2) {
            return Err(DrillError::InvalidConfig(format!(
                "failure quality threshold must be 1 or 2, got {}",
                self.failure_quality_threshold
            )));
        }
        if !(self.learn_fraction > 0.0 && self.learn_fraction < 1.0) {
            return Err(DrillError::InvalidConfig(format!(
                "learn fraction must lie in (0, 1), got {}",
                self.learn_fraction
            )));
        }
        if !(self.overdue_interval_factor >= 1.0) {
            return Err(DrillError::InvalidConfig(format!(
                "overdue interval factor must be >= 1.0, got {}",
                self.overdue_interval_factor
            )));
        }
        if !(self.sm5_initial_interval > 0.0) {
            return Err(DrillError::InvalidConfig(format!(
                "sm5 initial interval must be positive, got {}",
                self.sm5_initial_interval
            )));
        }
        if !(self.forgetting_index > 0.0 && self.forgetting_index <= 100.0) {
            return Err(DrillError::InvalidConfig(format!(
                "forgetting index must lie in (0, 100], got {}",
                self.forgetting_index
            )));
        }
        if self.cram_hours < 0 {
            return Err(DrillError::InvalidConfig("cram hours must not be negative".into()));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DrillError::InvalidConfig(format!("{} has malformed value '{}'", key, raw)))
}

/// Empty or `none` disables the setting.
fn parse_optional<T: FromStr>(key: &str, raw: &str) -> Result<Option<T>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_value(key, trimmed).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = DrillConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.algorithm, AlgorithmKind::Sm5);
        assert_eq!(config.leech_threshold, Some(15));
        assert_eq!(config.max_items_per_session, Some(30));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = DrillConfig::from_lookup(lookup_from(&[
            ("DRILL_ALGORITHM", "simple8"),
            ("DRILL_FAILURE_QUALITY", "1"),
            ("DRILL_LEECH_METHOD", "warn"),
            ("DRILL_MAX_ITEMS", "none"),
            ("DRILL_ADD_RANDOM_NOISE", "false"),
        ]))
        .unwrap();

        assert_eq!(config.algorithm, AlgorithmKind::Simple8);
        assert_eq!(config.failure_quality_threshold, 1);
        assert_eq!(config.leech_method, LeechMethod::Warn);
        assert_eq!(config.max_items_per_session, None);
        assert!(!config.add_random_noise);
        assert_eq!(config.days_before_old, 10);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = DrillConfig::from_lookup(lookup_from(&[("DRILL_FAILURE_QUALITY", "3")]));
        assert!(matches!(err, Err(DrillError::InvalidConfig(_))));

        let err = DrillConfig::from_lookup(lookup_from(&[("DRILL_LEARN_FRACTION", "1.0")]));
        assert!(matches!(err, Err(DrillError::InvalidConfig(_))));

        let err = DrillConfig::from_lookup(lookup_from(&[("DRILL_CRAM_HOURS", "twelve")]));
        assert!(matches!(err, Err(DrillError::InvalidConfig(_))));

        let err = DrillConfig::from_lookup(lookup_from(&[("DRILL_ALGORITHM", "sm17")]));
        assert!(matches!(err, Err(DrillError::InvalidConfig(_))));
    }
}
