//! Range slicing and the sequential per-slice fetch loop.
//!
//! `[start, end)` is cut into contiguous windows of at most
//! `granularity * samples_per_request`, the last one clipped to `end`. Each
//! window is fetched in turn; the exchange answers newest-first, so each
//! window's samples are reversed before their column value is appended.

use super::fetcher::RateLimitedFetcher;
use super::provider::{DataError, HistoricRates};
use super::request::FetchRequest;
use chrono::{Duration, NaiveDateTime};

/// Per-request sample cap of the Coinbase candles endpoint, as used here.
pub const MAX_SAMPLES_PER_REQUEST: u32 = 100;

/// Render a timestamp as zero-padded ISO-8601 without offset.
pub fn to_iso8601(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// One `[start, end)` window of the full range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Lazy iterator over the windows of a range.
#[derive(Debug, Clone)]
pub struct SubRanges {
    cursor: NaiveDateTime,
    end: NaiveDateTime,
    window: Duration,
}

impl Iterator for SubRanges {
    type Item = SubRange;

    fn next(&mut self) -> Option<SubRange> {
        if self.cursor >= self.end {
            return None;
        }
        let slice_end = self
            .cursor
            .checked_add_signed(self.window)
            .map_or(self.end, |t| t.min(self.end));
        let sub = SubRange {
            start: self.cursor,
            end: slice_end,
        };
        self.cursor = slice_end;
        Some(sub)
    }
}

/// Split `[start, end)` into windows of at most `samples_per_request` buckets.
pub fn slice_range(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: Duration,
    samples_per_request: u32,
) -> Result<SubRanges, DataError> {
    if start >= end {
        return Err(DataError::InvalidRange(format!(
            "start {start} is not before end {end}"
        )));
    }
    if granularity <= Duration::zero() {
        return Err(DataError::InvalidRange(
            "granularity must be positive".into(),
        ));
    }
    let per_request = i32::try_from(samples_per_request)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            DataError::InvalidRange(format!(
                "samples per request must be in 1..={}, got {samples_per_request}",
                i32::MAX
            ))
        })?;
    let window = granularity
        .checked_mul(per_request)
        .ok_or_else(|| DataError::InvalidRange("request window overflows".into()))?;

    Ok(SubRanges {
        cursor: start,
        end,
        window,
    })
}

/// Series assembled from every window, plus request accounting.
#[derive(Debug, Clone)]
pub struct RangeFetch {
    pub series: Vec<f64>,
    pub requests: usize,
    pub retries: u32,
}

/// Fetch every window of `request` in order and concatenate oldest-first.
///
/// Any window that exhausts its retries aborts the whole range.
pub fn fetch_range(
    fetcher: &RateLimitedFetcher<'_>,
    request: &FetchRequest,
    samples_per_request: u32,
) -> Result<RangeFetch, DataError> {
    request.validate()?;
    let granularity_secs = request.granularity_secs();

    // Reserve one window at a time; the full range may not fit in memory.
    let mut series = Vec::with_capacity(
        request
            .expected_samples()
            .min(samples_per_request as usize),
    );
    let mut requests = 0;
    let mut retries = 0;

    for sub in slice_range(
        request.start,
        request.end,
        request.granularity,
        samples_per_request,
    )? {
        let slice = fetcher.fetch_slice(
            &request.symbol,
            &to_iso8601(sub.start),
            &to_iso8601(sub.end),
            granularity_secs,
        )?;
        requests += 1;
        retries += slice.retries;
        append_reversed(&mut series, slice.rates, request.column)?;
    }

    Ok(RangeFetch {
        series,
        requests,
        retries,
    })
}

/// Append `column` of each sample, oldest first.
fn append_reversed(
    series: &mut Vec<f64>,
    rates: HistoricRates,
    column: usize,
) -> Result<(), DataError> {
    match rates {
        HistoricRates::Samples(samples) => {
            for sample in samples.iter().rev() {
                let value = sample.field(column).ok_or(DataError::MissingField {
                    column,
                    width: sample.width(),
                })?;
                series.push(value);
            }
            Ok(())
        }
        HistoricRates::Message { message } => Err(DataError::ExchangeRejected(message)),
        HistoricRates::Other(value) => Err(DataError::ExchangeRejected(format!(
            "unexpected response: {value}"
        ))),
    }
}
