//! pricecache core: chunked, rate-limited historic price fetching with an on-disk cache.
//!
//! - Range slicing into per-request windows
//! - Retry with exponential backoff on rate-limit rejections
//! - Parquet series cache keyed by filename
//! - TOML fetch configuration

pub mod config;
pub mod data;

pub use config::FetchConfig;
