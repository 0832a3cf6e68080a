//! Fetch configuration, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```toml
//! symbol = "BTC-USD"
//! start = "2017-01-01T00:00:00"
//! end = "2017-02-01T00:00:00"
//! granularity_minutes = 15
//! cache_key = "btc_15m.parquet"
//! ```

use crate::data::coinbase::DEFAULT_BASE_URL;
use crate::data::fetcher::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS};
use crate::data::provider::DataError;
use crate::data::request::FetchRequest;
use crate::data::slicer::MAX_SAMPLES_PER_REQUEST;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted `max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;

/// Largest accepted `backoff_base`, in seconds.
pub const MAX_BACKOFF_BASE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Product id, e.g. `ETH-USD`.
    pub symbol: String,
    /// Sample field to keep (3 = open).
    pub column: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity_minutes: i64,
    pub cache_dir: PathBuf,
    /// Filename of the cache entry inside `cache_dir`.
    pub cache_key: String,
    pub samples_per_request: u32,
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            symbol: "ETH-USD".into(),
            column: 3,
            start: midnight(2016, 6, 1),
            end: midnight(2018, 1, 25),
            granularity_minutes: 5,
            cache_dir: PathBuf::from("."),
            cache_key: "crypto_prices.parquet".into(),
            samples_per_request: MAX_SAMPLES_PER_REQUEST,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

fn midnight(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

impl FetchConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Config(format!("parse TOML: {e}")))
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.symbol.trim().is_empty() {
            return Err(DataError::Config("symbol must not be empty".into()));
        }
        if self.cache_key.trim().is_empty() {
            return Err(DataError::Config("cache_key must not be empty".into()));
        }
        if self.samples_per_request == 0 {
            return Err(DataError::Config("samples_per_request must be > 0".into()));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(DataError::Config(format!(
                "max_attempts must be in 1..={MAX_ATTEMPTS_LIMIT}, got {}",
                self.max_attempts
            )));
        }
        if !(1.0..=MAX_BACKOFF_BASE).contains(&self.backoff_base) {
            return Err(DataError::Config(format!(
                "backoff_base must be in 1.0..={MAX_BACKOFF_BASE}, got {}",
                self.backoff_base
            )));
        }
        if self.granularity_minutes <= 0 {
            return Err(DataError::Config(format!(
                "granularity_minutes must be > 0, got {}",
                self.granularity_minutes
            )));
        }
        self.to_request().validate()
    }

    pub fn to_request(&self) -> FetchRequest {
        FetchRequest {
            symbol: self.symbol.clone(),
            column: self.column,
            start: self.start,
            end: self.end,
            granularity: Duration::try_minutes(self.granularity_minutes)
                .unwrap_or_else(Duration::zero),
        }
    }
}
