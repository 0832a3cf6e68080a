//! Exchange boundary trait, response model and structured error types.
//!
//! The HistoricRatesSource trait abstracts over the exchange so the fetcher can
//! be driven by the real HTTP client or by a scripted fake in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message the exchange embeds in the body when a caller is throttled.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// One fixed-width candle record, as delivered by the exchange.
///
/// Coinbase layout: `[time, low, high, open, close, volume]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(pub Vec<f64>);

impl Sample {
    /// Field at `column`, if the record is wide enough.
    pub fn field(&self, column: usize) -> Option<f64> {
        self.0.get(column).copied()
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }
}

/// Decoded body of a historic-rates response.
///
/// Only `Message` bodies carrying [`RATE_LIMIT_MESSAGE`] are treated as
/// rejections by the fetcher; every other shape counts as a response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoricRates {
    /// Samples in descending time order.
    Samples(Vec<Sample>),
    Message { message: String },
    Other(serde_json::Value),
}

impl HistoricRates {
    /// Parse a raw response body. Non-JSON bodies are a `Decode` error.
    pub fn from_body(body: &str) -> Result<Self, DataError> {
        serde_json::from_str(body)
            .map_err(|e| DataError::Decode(e.to_string()))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HistoricRates::Message { message } if message == RATE_LIMIT_MESSAGE)
    }
}

/// Structured error types for fetch and cache operations.
///
/// These are designed to be displayable in CLI contexts.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("malformed response from exchange: {0}")]
    Decode(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error(
        "exchange unavailable: {symbol} sub-range {start} to {end} failed after {attempts} attempts"
    )]
    RetriesExhausted {
        symbol: String,
        start: String,
        end: String,
        attempts: u32,
    },

    #[error("exchange rejected request: {0}")]
    ExchangeRejected(String),

    #[error("sample has {width} fields, column {column} requested")]
    MissingField { column: usize, width: usize },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("cache write failed: {0}")]
    CacheWrite(String),

    #[error("config error: {0}")]
    Config(String),
}

impl DataError {
    /// Transport and decode failures are retried without backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, DataError::Decode(_) | DataError::Transport(_))
    }
}

/// Where a returned series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    Exchange,
    Cache,
}

/// The exchange's historic-rates query.
///
/// Implementations perform exactly one request per call and do not retry;
/// retry and backoff live in the fetcher above this trait.
pub trait HistoricRatesSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch candles for `[start, end)`. Timestamps are ISO-8601 local-naive
    /// strings, `granularity_secs` is the bucket width in seconds.
    fn get_historic_rates(
        &self,
        symbol: &str,
        start: &str,
        end: &str,
        granularity_secs: i64,
    ) -> Result<HistoricRates, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candle_arrays() {
        let body = "[[1464739500, 11.5, 11.7, 11.6, 11.65, 120.5], [1464739200, 11.4, 11.6, 11.45, 11.5, 98]]";
        let rates = HistoricRates::from_body(body).unwrap();
        match rates {
            HistoricRates::Samples(samples) => {
                assert_eq!(samples.len(), 2);
                assert_eq!(samples[0].field(3), Some(11.6));
                assert_eq!(samples[1].field(5), Some(98.0));
                assert_eq!(samples[1].field(6), None);
            }
            other => panic!("expected samples, got {other:?}"),
        }
    }

    #[test]
    fn detects_rate_limit_message() {
        let rates = HistoricRates::from_body(r#"{"message":"Rate limit exceeded"}"#).unwrap();
        assert!(rates.is_rate_limited());

        let other = HistoricRates::from_body(r#"{"message":"NotFound"}"#).unwrap();
        assert!(!other.is_rate_limited());
    }

    #[test]
    fn unknown_json_shapes_are_not_rejections() {
        let rates = HistoricRates::from_body(r#"{"candles": 3}"#).unwrap();
        assert!(matches!(rates, HistoricRates::Other(_)));
        assert!(!rates.is_rate_limited());
    }

    #[test]
    fn non_json_body_is_transient_decode_error() {
        let err = HistoricRates::from_body("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, DataError::Decode(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn empty_array_is_empty_samples() {
        let rates = HistoricRates::from_body("[]").unwrap();
        assert_eq!(rates, HistoricRates::Samples(vec![]));
    }
}
