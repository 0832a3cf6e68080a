//! Historic price download and caching

pub mod cache;
pub mod coinbase;
pub mod download;
pub mod fetcher;
pub mod provider;
pub mod request;
pub mod sleeper;
pub mod slicer;

pub use cache::{CacheMeta, SeriesCache};
pub use coinbase::CoinbaseClient;
pub use download::{download_series, DownloadOptions, FetchOutcome, FetchReport};
pub use fetcher::RateLimitedFetcher;
pub use provider::{DataError, HistoricRates, HistoricRatesSource, Sample, SeriesSource};
pub use request::FetchRequest;
pub use sleeper::{Sleeper, ThreadSleeper};
pub use slicer::{fetch_range, slice_range, to_iso8601, SubRange, MAX_SAMPLES_PER_REQUEST};
