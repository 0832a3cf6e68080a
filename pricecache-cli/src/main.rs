//! pricecache CLI: fetch and cache inspection commands.
//!
//! Commands:
//! - `fetch`: download a historic price series (or reuse the cached one)
//! - `cache info`: show what a cache entry holds and how it was produced

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use pricecache_core::data::{
    download_series, CoinbaseClient, DownloadOptions, FetchOutcome, RateLimitedFetcher,
    SeriesCache, SeriesSource, ThreadSleeper,
};
use pricecache_core::FetchConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pricecache",
    about = "pricecache: chunked, rate-limited historic price downloads with a local cache"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a historic price series, reusing the cache entry when present.
    Fetch {
        /// TOML config file. Flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Product id (e.g., ETH-USD).
        #[arg(long)]
        symbol: Option<String>,

        /// Sample field to keep: 1 low, 2 high, 3 open, 4 close, 5 volume.
        #[arg(long)]
        column: Option<usize>,

        /// Start (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        start: Option<String>,

        /// End, exclusive (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        end: Option<String>,

        /// Bucket width in minutes.
        #[arg(long)]
        granularity: Option<i64>,

        /// Cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Cache entry filename. Not tied to the other parameters: reuse a key
        /// and you get whatever is stored under it.
        #[arg(long)]
        cache_key: Option<String>,

        /// Exchange base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Ignore the cache entry and refetch.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the metadata and sample count of a cache entry.
    Info {
        /// Cache entry filename.
        #[arg(default_value = "crypto_prices.parquet")]
        key: String,

        /// Cache directory.
        #[arg(long, default_value = ".")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            config,
            symbol,
            column,
            start,
            end,
            granularity,
            cache_dir,
            cache_key,
            base_url,
            force,
        } => {
            let mut cfg = match config {
                Some(path) => FetchConfig::from_file(&path)?,
                None => FetchConfig::default(),
            };
            if let Some(v) = symbol {
                cfg.symbol = v;
            }
            if let Some(v) = column {
                cfg.column = v;
            }
            if let Some(v) = start.as_deref() {
                cfg.start = parse_datetime(v)?;
            }
            if let Some(v) = end.as_deref() {
                cfg.end = parse_datetime(v)?;
            }
            if let Some(v) = granularity {
                cfg.granularity_minutes = v;
            }
            if let Some(v) = cache_dir {
                cfg.cache_dir = v;
            }
            if let Some(v) = cache_key {
                cfg.cache_key = v;
            }
            if let Some(v) = base_url {
                cfg.base_url = v;
            }
            run_fetch(&cfg, force)
        }
        Commands::Cache { action } => match action {
            CacheAction::Info { key, cache_dir } => run_cache_info(&cache_dir, &key),
        },
    }
}

fn run_fetch(cfg: &FetchConfig, force: bool) -> Result<()> {
    cfg.validate()?;

    let client = CoinbaseClient::with_base_url(cfg.base_url.clone())?;
    let sleeper = ThreadSleeper;
    let fetcher = RateLimitedFetcher::new(&client, &sleeper)
        .with_max_attempts(cfg.max_attempts)
        .with_backoff_base(cfg.backoff_base);
    let cache = SeriesCache::new(&cfg.cache_dir);
    let opts = DownloadOptions {
        samples_per_request: cfg.samples_per_request,
        force,
    };

    let outcome = download_series(&fetcher, &cache, &cfg.cache_key, &cfg.to_request(), &opts)
        .with_context(|| format!("fetching {} into {}", cfg.symbol, cfg.cache_key))?;

    print_summary(cfg, &outcome);
    Ok(())
}

fn run_cache_info(cache_dir: &std::path::Path, key: &str) -> Result<()> {
    let cache = SeriesCache::new(cache_dir);
    let path = cache.path(key);
    if !cache.contains(key) {
        bail!("no cache entry at {}", path.display());
    }

    println!("Entry:       {}", path.display());
    match cache.load(key) {
        Ok(series) => println!("Samples:     {}", series.len()),
        Err(e) => println!("Samples:     unreadable ({e})"),
    }

    match cache.get_meta(key) {
        Some(meta) => {
            println!("Symbol:      {}", meta.symbol);
            println!("Column:      {}", meta.column);
            println!("Range:       {} to {}", meta.start, meta.end);
            println!("Granularity: {}s", meta.granularity_secs);
            println!("Cached at:   {}", meta.cached_at);
            println!("Data hash:   {}", meta.data_hash);
        }
        None => println!("(no metadata sidecar)"),
    }
    Ok(())
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD[THH:MM:SS]"))?;
    date.and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid date '{s}'"))
}

fn print_summary(cfg: &FetchConfig, outcome: &FetchOutcome) {
    let series = &outcome.series;
    let source = match outcome.report.source {
        SeriesSource::Cache => "cache",
        SeriesSource::Exchange => "exchange",
    };

    println!();
    println!("=== {} ===", cfg.symbol);
    println!("Period:    {} to {}", cfg.start, cfg.end);
    println!("Samples:   {}", series.len());
    println!("Source:    {source}");
    if outcome.report.source == SeriesSource::Exchange {
        println!("Requests:  {}", outcome.report.requests);
        println!("Retries:   {}", outcome.report.retries);
    }
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("First:     {first:.2}");
        println!("Last:      {last:.2}");
        println!("Min:       {min:.2}");
        println!("Max:       {max:.2}");
    }
    println!();
}
