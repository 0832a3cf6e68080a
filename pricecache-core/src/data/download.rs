//! Download orchestrator: cache gate in front of the sliced, rate-limited fetch.

use super::cache::{CacheMeta, SeriesCache};
use super::fetcher::RateLimitedFetcher;
use super::provider::{DataError, SeriesSource};
use super::request::FetchRequest;
use super::slicer::{fetch_range, MAX_SAMPLES_PER_REQUEST};
use tracing::{debug, info, warn};

/// Knobs for a single series download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub samples_per_request: u32,
    /// Skip the cache lookup and refetch, overwriting the entry on success.
    pub force: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            samples_per_request: MAX_SAMPLES_PER_REQUEST,
            force: false,
        }
    }
}

/// What a download did to produce its series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub source: SeriesSource,
    pub requests: usize,
    pub retries: u32,
}

/// A price series, oldest first, and how it was obtained.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub series: Vec<f64>,
    pub report: FetchReport,
}

/// Return the series cached under `key`, or fetch it and cache it.
///
/// The entry is written once, after every sub-range has been fetched. A
/// failure anywhere in the range returns the error and writes nothing.
pub fn download_series(
    fetcher: &RateLimitedFetcher<'_>,
    cache: &SeriesCache,
    key: &str,
    request: &FetchRequest,
    opts: &DownloadOptions,
) -> Result<FetchOutcome, DataError> {
    request.validate()?;

    if !opts.force {
        match cache.load(key) {
            Ok(series) => {
                warn_if_stale(cache, key, request);
                info!(%key, samples = series.len(), "cache hit");
                return Ok(FetchOutcome {
                    series,
                    report: FetchReport {
                        source: SeriesSource::Cache,
                        requests: 0,
                        retries: 0,
                    },
                });
            }
            Err(e) => debug!(%key, reason = %e, "cache miss"),
        }
    }

    info!(
        symbol = %request.symbol,
        start = %request.start,
        end = %request.end,
        granularity_secs = request.granularity_secs(),
        source = fetcher.source_name(),
        "fetching historic rates"
    );
    let fetched = fetch_range(fetcher, request, opts.samples_per_request)?;

    let meta = CacheMeta::for_request(key, request, &fetched.series);
    cache.store(key, &fetched.series, &meta)?;
    info!(%key, samples = fetched.series.len(), requests = fetched.requests, "cached series");

    Ok(FetchOutcome {
        series: fetched.series,
        report: FetchReport {
            source: SeriesSource::Exchange,
            requests: fetched.requests,
            retries: fetched.retries,
        },
    })
}

/// The cache is keyed by filename only; flag entries written for other parameters.
fn warn_if_stale(cache: &SeriesCache, key: &str, request: &FetchRequest) {
    if let Some(meta) = cache.get_meta(key) {
        if meta.params_fingerprint != request.fingerprint() {
            warn!(
                %key,
                cached_symbol = %meta.symbol,
                cached_start = %meta.start,
                cached_end = %meta.end,
                cached_granularity_secs = meta.granularity_secs,
                "cache entry was written for different parameters; returning it anyway"
            );
        }
    }
}
