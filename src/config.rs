//! Run configuration for an orphan sweep.
//!
//! A sweep is configured per run; nothing here persists between runs.
//!
//! # Example
//!
//! ```toml
//! parent_table = "users"
//! child_table = "user-sessions"
//! key_attribute = "id"
//! reference_attribute = "userId"
//! max_workers = 100
//!
//! [timestamp_filter]
//! attribute = "createdAt"
//! format = "%Y-%m-%dT%H:%M:%S"
//! min_age_secs = 3600
//! ```

use chrono::{
    Duration, NaiveDateTime, Utc,
    format::{Item, StrftimeItems},
};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, store::MAX_BATCH_SIZE};

/// Configuration for a single orphan-sweep run.
///
/// Immutable for the duration of the run. `parent_table` holds the entities
/// being referenced; `child_table` holds the dependent records swept for
/// orphans. `key_attribute` names the primary key on both tables, and
/// `reference_attribute` names the child attribute that points at a parent
/// key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Table holding the parent entities.
    pub parent_table: String,

    /// Table holding the dependent records to sweep.
    pub child_table: String,

    /// Primary key attribute name, shared by both tables.
    pub key_attribute: String,

    /// Child attribute referencing a parent's key.
    pub reference_attribute: String,

    /// Concurrent in-flight delete submissions. Classification blocks once
    /// this many batches are in flight.
    /// Default: 100
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Keys per batch-delete call, capped by the store's batch-write limit.
    /// Default: 25
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Age guard for orphans. When set, an orphan is only deleted once its
    /// timestamp attribute parses to an instant older than `min_age_secs`.
    /// When unset, every orphan is deleted regardless of age.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_filter: Option<TimestampFilter>,

    /// If true, log what would be deleted without deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Retry policy for unprocessed keys and transient delete failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_workers() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

impl SweepConfig {
    /// Create a config with default worker, batch, and retry settings.
    pub fn new(
        parent_table: impl Into<String>,
        child_table: impl Into<String>,
        key_attribute: impl Into<String>,
        reference_attribute: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            child_table: child_table.into(),
            key_attribute: key_attribute.into(),
            reference_attribute: reference_attribute.into(),
            max_workers: default_max_workers(),
            max_batch_size: default_max_batch_size(),
            timestamp_filter: None,
            dry_run: false,
            retry: RetryConfig::default(),
        }
    }

    /// Set the worker-pool ceiling.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Guard orphans younger than one hour, read from `attribute` under the
    /// given strftime `format`.
    pub fn with_timestamp_filter(
        mut self,
        attribute: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        self.timestamp_filter = Some(TimestampFilter {
            attribute: attribute.into(),
            format: format.into(),
            min_age_secs: default_min_age_secs(),
        });
        self
    }

    /// Log what would be deleted without deleting.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the configuration. Called by the sweep before any store
    /// call, so misconfiguration never deletes anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("parent_table", &self.parent_table),
            ("child_table", &self.child_table),
            ("key_attribute", &self.key_attribute),
            ("reference_attribute", &self.reference_attribute),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField { field });
            }
        }
        if self.parent_table == self.child_table {
            return Err(ConfigError::SameTable);
        }
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                max: MAX_BATCH_SIZE,
            });
        }
        if let Some(filter) = &self.timestamp_filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Age guard for delete-eligible records.
///
/// Protects just-inserted children whose parent write is not yet
/// scan-visible: an orphan younger than `min_age_secs` (or whose age cannot
/// be determined) is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampFilter {
    /// Attribute carrying the record's creation time.
    pub attribute: String,

    /// strftime-style format the attribute is stored in.
    pub format: String,

    /// Records younger than this many seconds are never deleted.
    /// Default: 3600 (one hour)
    #[serde(default = "default_min_age_secs")]
    pub min_age_secs: u64,
}

fn default_min_age_secs() -> u64 {
    3600
}

impl TimestampFilter {
    /// The cutoff instant for the current run: now minus the minimum age.
    /// Timestamps are interpreted as UTC.
    pub fn cutoff(&self) -> NaiveDateTime {
        Utc::now().naive_utc() - Duration::seconds(self.min_age_secs as i64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.attribute.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                field: "timestamp_filter.attribute",
            });
        }
        if self.format.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                field: "timestamp_filter.format",
            });
        }
        if StrftimeItems::new(&self.format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimestampFormat {
                format: self.format.clone(),
            });
        }
        Ok(())
    }
}

/// Retry policy for batch deletions.
///
/// Applies per batch: unprocessed keys and transient store errors are
/// retried with exponential backoff until acknowledged or `max_retries`
/// attempts are exhausted. Exhaustion is a logged per-key failure, not a
/// run failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial
    /// submission). Deletion is idempotent, so retrying aggressively is safe.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter applied to delays (fraction, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        std::time::Duration::from_millis(final_delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn base_config() -> SweepConfig {
        SweepConfig::new("users", "sessions", "id", "userId")
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.max_workers, 100);
        assert_eq!(config.max_batch_size, 25);
        assert!(config.timestamp_filter.is_none());
        assert!(!config.dry_run);
        assert!(config.retry.enabled);
        assert_eq!(config.retry.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            parent_table = "users"
            child_table = "sessions"
            key_attribute = "id"
            reference_attribute = "userId"
        "#;
        let config: SweepConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_workers, 100);
        assert_eq!(config.max_batch_size, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            parent_table = "users"
            child_table = "sessions"
            key_attribute = "id"
            reference_attribute = "userId"
            max_workers = 8
            max_batch_size = 10
            dry_run = true

            [timestamp_filter]
            attribute = "createdAt"
            format = "%Y-%m-%dT%H:%M:%S"
            min_age_secs = 7200

            [retry]
            max_retries = 2
            initial_delay_ms = 50
        "#;
        let config: SweepConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_batch_size, 10);
        assert!(config.dry_run);

        let filter = config.timestamp_filter.as_ref().unwrap();
        assert_eq!(filter.attribute, "createdAt");
        assert_eq!(filter.min_age_secs, 7200);

        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.initial_delay_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::parent_table("parent_table")]
    #[case::child_table("child_table")]
    #[case::key_attribute("key_attribute")]
    #[case::reference_attribute("reference_attribute")]
    fn test_empty_required_field_rejected(#[case] field: &'static str) {
        let mut config = base_config();
        match field {
            "parent_table" => config.parent_table = "  ".into(),
            "child_table" => config.child_table = String::new(),
            "key_attribute" => config.key_attribute = String::new(),
            _ => config.reference_attribute = String::new(),
        }
        assert_eq!(config.validate(), Err(ConfigError::EmptyField { field }));
    }

    #[test]
    fn test_same_table_rejected() {
        let config = SweepConfig::new("users", "users", "id", "userId");
        assert_eq!(config.validate(), Err(ConfigError::SameTable));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = base_config().with_max_workers(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWorkers));
    }

    #[rstest]
    #[case(0)]
    #[case(26)]
    fn test_batch_size_out_of_range_rejected(#[case] size: usize) {
        let mut config = base_config();
        config.max_batch_size = size;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize { max: 25 })
        );
    }

    #[test]
    fn test_invalid_timestamp_format_rejected() {
        let mut config = base_config().with_timestamp_filter("createdAt", "%Y-%Q");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimestampFormat { .. })
        ));

        config = base_config().with_timestamp_filter("createdAt", "%Y-%m-%dT%H:%M:%S");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cutoff_is_min_age_in_the_past() {
        let filter = TimestampFilter {
            attribute: "createdAt".into(),
            format: "%Y-%m-%dT%H:%M:%S".into(),
            min_age_secs: 3600,
        };
        let cutoff = filter.cutoff();
        let age = Utc::now().naive_utc() - cutoff;
        assert!(age >= Duration::seconds(3600));
        assert!(age < Duration::seconds(3660));
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.0, // Disable jitter for deterministic testing
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 400);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 800);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 10.0,
            jitter: 0.0,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(5).as_millis(), 5000);
    }

    #[test]
    fn test_delay_with_jitter() {
        let config = RetryConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
            ..Default::default()
        };

        for _ in 0..10 {
            let ms = config.delay_for_attempt(0).as_millis();
            assert!((800..=1200).contains(&ms), "Delay {} out of range", ms);
        }
    }
}
