use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};

pub const KEY_AGGREGATE_TIMEOUT_MS: &str = "aggregate_timeout_ms";
pub const KEY_QUERY_TIMEOUT_MS: &str = "query_timeout_ms";
pub const KEY_BUCKET_STRATEGY: &str = "bucket_strategy";
pub const KEY_MAX_RANGE_DAYS: &str = "max_range_days";

/// Config keys the engine understands, in display order.
pub const KNOWN_KEYS: &[&str] = &[
    KEY_AGGREGATE_TIMEOUT_MS,
    KEY_QUERY_TIMEOUT_MS,
    KEY_BUCKET_STRATEGY,
    KEY_MAX_RANGE_DAYS,
];

const DEFAULT_AGGREGATE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_RANGE_DAYS: u32 = 3_660;

/// How chart series are read from the dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStrategy {
    /// One grouped-by-day aggregation per series.
    #[default]
    Grouped,
    /// One count per calendar day.
    PerDay,
}

impl FromStr for BucketStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grouped" => Ok(BucketStrategy::Grouped),
            "per_day" => Ok(BucketStrategy::PerDay),
            other => Err(Error::Config(format!(
                "unknown bucket strategy '{other}' (expected 'grouped' or 'per_day')"
            ))),
        }
    }
}

impl fmt::Display for BucketStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketStrategy::Grouped => f.write_str("grouped"),
            BucketStrategy::PerDay => f.write_str("per_day"),
        }
    }
}

/// Tuning for one insights request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightConfig {
    /// Upper bound for the whole fan-out of one request.
    pub aggregate_timeout: Duration,
    /// Upper bound for any single dataset read.
    pub query_timeout: Duration,
    pub bucket_strategy: BucketStrategy,
    /// Longest requested window, in days, that will be read.
    pub max_range_days: u32,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            aggregate_timeout: Duration::from_millis(DEFAULT_AGGREGATE_TIMEOUT_MS),
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            bucket_strategy: BucketStrategy::Grouped,
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
        }
    }
}

impl InsightConfig {
    /// Load from `app_config`, falling back to defaults for unset keys.
    pub async fn load(db: &Database) -> Result<Self> {
        let entries = db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Self::from_entries(entries.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in entries {
            config.apply(key, value)?;
        }
        if config.query_timeout > config.aggregate_timeout {
            log::warn!(
                "{KEY_QUERY_TIMEOUT_MS} ({:?}) exceeds {KEY_AGGREGATE_TIMEOUT_MS} ({:?}); the aggregate limit wins",
                config.query_timeout,
                config.aggregate_timeout
            );
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_AGGREGATE_TIMEOUT_MS => self.aggregate_timeout = parse_millis(key, value)?,
            KEY_QUERY_TIMEOUT_MS => self.query_timeout = parse_millis(key, value)?,
            KEY_BUCKET_STRATEGY => self.bucket_strategy = value.parse()?,
            KEY_MAX_RANGE_DAYS => self.max_range_days = parse_days(key, value)?,
            other => log::debug!("Ignoring config key {other}"),
        }
        Ok(())
    }
}

/// Check a key/value pair before it is stored.
pub fn validate_entry(key: &str, value: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        return Err(Error::Config(format!(
            "unknown config key '{key}' (known: {})",
            KNOWN_KEYS.join(", ")
        )));
    }
    InsightConfig::default().apply(key, value)
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number of milliseconds")))?;
    if ms == 0 {
        return Err(Error::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_days(key: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(Error::Config(format!("{key} must be greater than zero"))),
        Ok(days) => Ok(days),
        Err(_) => Err(Error::Config(format!("{key} must be a whole number of days"))),
    }
}
