//! Rate-limited fetch of a single sub-range.
//!
//! Retry policy per sub-range, up to `max_attempts` calls:
//! - transport/decode failure: retry immediately
//! - rate-limit rejection: block for `backoff_base^attempt` seconds, then retry
//! - anything else: success, whatever the payload shape
//!
//! Running out of attempts is fatal for the whole fetch.

use super::provider::{DataError, HistoricRates, HistoricRatesSource};
use super::sleeper::Sleeper;
use std::time::Duration;
use tracing::{info, warn};

/// Per-sub-range attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Base of the exponential backoff, in seconds.
pub const DEFAULT_BACKOFF_BASE: f64 = 1.5;

/// Wait before retrying after a rate-limited attempt `attempt` (0-based).
///
/// Saturates at `Duration::MAX` when `base^attempt` is not representable.
pub fn backoff_delay(base: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    Duration::try_from_secs_f64(base.powi(exponent)).unwrap_or(Duration::MAX)
}

/// A successful sub-range response and how many retries it took.
#[derive(Debug, Clone)]
pub struct SliceFetch {
    pub rates: HistoricRates,
    pub retries: u32,
}

/// Issues one sub-range request at a time, retrying until the exchange answers.
pub struct RateLimitedFetcher<'a> {
    source: &'a dyn HistoricRatesSource,
    sleeper: &'a dyn Sleeper,
    max_attempts: u32,
    backoff_base: f64,
}

impl<'a> RateLimitedFetcher<'a> {
    pub fn new(source: &'a dyn HistoricRatesSource, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            source,
            sleeper,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: f64) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch one sub-range, retrying transient failures and rate limits.
    pub fn fetch_slice(
        &self,
        symbol: &str,
        start: &str,
        end: &str,
        granularity_secs: i64,
    ) -> Result<SliceFetch, DataError> {
        for attempt in 0..self.max_attempts {
            match self
                .source
                .get_historic_rates(symbol, start, end, granularity_secs)
            {
                Err(e) if e.is_transient() => {
                    warn!(%symbol, %start, attempt, error = %e, "request failed, retrying");
                }
                Err(e) => return Err(e),
                Ok(rates) if rates.is_rate_limited() => {
                    // No point waiting when no attempt follows
                    if attempt + 1 < self.max_attempts {
                        let delay = backoff_delay(self.backoff_base, attempt);
                        warn!(
                            %symbol,
                            %start,
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            "rate limit exceeded, backing off"
                        );
                        self.sleeper.sleep(delay);
                    } else {
                        warn!(%symbol, %start, attempt, "rate limit exceeded");
                    }
                }
                Ok(rates) => {
                    info!(date = %start, retries = attempt, "fetch successful");
                    return Ok(SliceFetch {
                        rates,
                        retries: attempt,
                    });
                }
            }
        }

        Err(DataError::RetriesExhausted {
            symbol: symbol.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            attempts: self.max_attempts,
        })
    }
}
