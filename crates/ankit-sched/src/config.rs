//! In-process scheduler settings.
//!
//! These complement the per-deck options persisted in the collection. They
//! can be built in code or loaded from a TOML file:
//!
//! ```toml
//! version = "v2"
//! queue_limit = 50
//! review_pop_order = "head_first"
//! rollover_unbury = "siblings"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which answer policy the scheduler applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerVersion {
    /// Three learning buttons; relearning cards keep the review type.
    V1,
    /// Four learning buttons, a distinct relearning type, preview mode for
    /// filtered decks that do not reschedule.
    #[default]
    V2,
}

/// Which end of a filled review queue is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPopOrder {
    /// Serve from the front: filtered decks give earliest-due first.
    #[default]
    HeadFirst,
    /// Serve from the back: filtered decks give latest-due first.
    TailFirst,
}

/// Which buried cards the automatic day-rollover pass lifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverUnbury {
    /// Only sibling-buried cards; manual buries persist until explicitly lifted.
    #[default]
    Siblings,
    /// Sibling and manually buried cards.
    All,
}

/// Scheduler settings that are not stored in the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Answer policy.
    pub version: SchedulerVersion,
    /// Upper bound on rows fetched or counted per queue.
    pub report_limit: usize,
    /// Maximum rows materialized per deck when filling new/review queues.
    pub queue_limit: usize,
    /// Review queue pop convention.
    pub review_pop_order: ReviewPopOrder,
    /// Automatic unbury scope at day rollover.
    pub rollover_unbury: RolloverUnbury,
    /// Seconds per card assumed by the ETA when there is no review history.
    pub default_answer_time_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            version: SchedulerVersion::default(),
            report_limit: 99_999,
            queue_limit: 50,
            review_pop_order: ReviewPopOrder::default(),
            rollover_unbury: RolloverUnbury::default(),
            default_answer_time_secs: 20.0,
        }
    }
}

impl SchedulerConfig {
    /// Load settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.queue_limit == 0 {
            return Err(Error::Config("queue_limit must be at least 1".into()));
        }
        if self.report_limit < self.queue_limit {
            return Err(Error::Config(format!(
                "report_limit ({}) must not be below queue_limit ({})",
                self.report_limit, self.queue_limit
            )));
        }
        if !self.default_answer_time_secs.is_finite() || self.default_answer_time_secs < 0.0 {
            return Err(Error::Config(
                "default_answer_time_secs must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Use the given answer policy.
    pub fn with_version(mut self, version: SchedulerVersion) -> Self {
        self.version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.version, SchedulerVersion::V2);
        assert_eq!(config.report_limit, 99_999);
        assert_eq!(config.queue_limit, 50);
        assert_eq!(config.review_pop_order, ReviewPopOrder::HeadFirst);
        assert_eq!(config.rollover_unbury, RolloverUnbury::Siblings);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = SchedulerConfig::parse(
            r#"
version = "v1"
review_pop_order = "tail_first"
rollover_unbury = "all"
"#,
        )
        .unwrap();
        assert_eq!(config.version, SchedulerVersion::V1);
        assert_eq!(config.review_pop_order, ReviewPopOrder::TailFirst);
        assert_eq!(config.rollover_unbury, RolloverUnbury::All);
        assert_eq!(config.queue_limit, 50);
    }

    #[test]
    fn test_parse_rejects_zero_queue_limit() {
        let err = SchedulerConfig::parse("queue_limit = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let err = SchedulerConfig::parse(r#"version = "v9""#).unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sched.toml");
        std::fs::write(&path, "queue_limit = 10\nreport_limit = 100\n").unwrap();

        let config = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(config.queue_limit, 10);
        assert_eq!(config.report_limit, 100);
    }
}
