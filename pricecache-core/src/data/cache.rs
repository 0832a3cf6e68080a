//! Parquet cache for price series, addressed by filename.
//!
//! Layout: `{cache_dir}/{key}` holds a single `value: f64` column, and
//! `{cache_dir}/{key}.meta.json` is the metadata sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - The data file alone decides hit or miss; the sidecar is informational
//! - The key is NOT bound to the request parameters. Two requests sharing a key
//!   share an entry, and callers must choose keys accordingly.

use super::provider::DataError;
use super::request::FetchRequest;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const VALUE_COLUMN: &str = "value";

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub key: String,
    pub symbol: String,
    pub column: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity_secs: i64,
    pub sample_count: usize,
    pub data_hash: String,
    pub params_fingerprint: String,
    pub cached_at: NaiveDateTime,
}

impl CacheMeta {
    pub fn for_request(key: &str, request: &FetchRequest, series: &[f64]) -> Self {
        Self {
            key: key.to_string(),
            symbol: request.symbol.clone(),
            column: request.column,
            start: request.start,
            end: request.end,
            granularity_secs: request.granularity_secs(),
            sample_count: series.len(),
            data_hash: hash_series(series),
            params_fingerprint: request.fingerprint(),
            cached_at: chrono::Local::now().naive_local(),
        }
    }
}

/// BLAKE3 over the little-endian bytes of every value.
pub fn hash_series(series: &[f64]) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in series {
        hasher.update(&v.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// The series cache.
#[derive(Debug, Clone)]
pub struct SeriesCache {
    cache_dir: PathBuf,
}

impl SeriesCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path to the data file for a key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.meta.json"))
    }

    /// Whether a data file exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    /// Load the series stored under `key`.
    ///
    /// A missing, unreadable or malformed file is `CacheUnavailable`.
    pub fn load(&self, key: &str) -> Result<Vec<f64>, DataError> {
        let path = self.path(key);
        let file = fs::File::open(&path)
            .map_err(|e| DataError::CacheUnavailable(format!("{}: {e}", path.display())))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::CacheUnavailable(format!("{}: read: {e}", path.display())))?;

        let values = df
            .column(VALUE_COLUMN)
            .map_err(|e| {
                DataError::CacheUnavailable(format!("{}: missing column: {e}", path.display()))
            })?
            .f64()
            .map_err(|e| {
                DataError::CacheUnavailable(format!("{}: column type: {e}", path.display()))
            })?;

        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    /// Write `series` under `key` together with its sidecar.
    ///
    /// Both files are staged as `.tmp` first. The old sidecar is removed before
    /// the data rename, so a new series is never paired with a stale sidecar.
    pub fn store(&self, key: &str, series: &[f64], meta: &CacheMeta) -> Result<(), DataError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::CacheWrite(format!("failed to create dir: {e}")))?;

        let mut df = DataFrame::new(vec![Column::new(VALUE_COLUMN.into(), series.to_vec())])
            .map_err(|e| DataError::CacheWrite(format!("dataframe creation: {e}")))?;
        let meta_json = serde_json::to_string_pretty(meta)
            .map_err(|e| DataError::CacheWrite(format!("meta serialization: {e}")))?;

        let path = self.path(key);
        let meta_path = self.meta_path(key);
        let tmp_path = self.cache_dir.join(format!("{key}.tmp"));
        let meta_tmp_path = self.cache_dir.join(format!("{key}.meta.json.tmp"));
        let discard_tmps = || {
            let _ = fs::remove_file(&tmp_path);
            let _ = fs::remove_file(&meta_tmp_path);
        };

        let file = fs::File::create(&tmp_path)
            .map_err(|e| DataError::CacheWrite(format!("create file: {e}")))?;
        ParquetWriter::new(file).finish(&mut df).map_err(|e| {
            discard_tmps();
            DataError::CacheWrite(format!("write parquet: {e}"))
        })?;
        fs::write(&meta_tmp_path, meta_json).map_err(|e| {
            discard_tmps();
            DataError::CacheWrite(format!("meta write: {e}"))
        })?;

        remove_if_exists(&meta_path).map_err(|e| {
            discard_tmps();
            DataError::CacheWrite(format!("remove old meta: {e}"))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            discard_tmps();
            DataError::CacheWrite(format!("atomic rename failed: {e}"))
        })?;
        fs::rename(&meta_tmp_path, &meta_path).map_err(|e| {
            discard_tmps();
            let _ = fs::remove_file(&path);
            DataError::CacheWrite(format!("meta rename failed: {e}"))
        })?;

        Ok(())
    }

    /// Sidecar metadata for `key`, if present and parseable.
    pub fn get_meta(&self, key: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn request() -> FetchRequest {
        let day = NaiveDate::from_ymd_opt(2016, 6, 1).unwrap();
        FetchRequest {
            symbol: "ETH-USD".into(),
            column: 3,
            start: day.and_hms_opt(0, 0, 0).unwrap(),
            end: day.and_hms_opt(0, 15, 0).unwrap(),
            granularity: Duration::minutes(5),
        }
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let series = vec![11.5, 11.625, 0.1 + 0.2, f64::MAX, -3.0e-12];
        let meta = CacheMeta::for_request("prices.parquet", &request(), &series);

        cache.store("prices.parquet", &series, &meta).unwrap();
        let loaded = cache.load("prices.parquet").unwrap();

        assert_eq!(loaded, series);
        assert!(cache.contains("prices.parquet"));
        assert!(!dir.path().join("prices.parquet.tmp").exists());
    }

    #[test]
    fn load_missing_is_cache_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());

        assert!(!cache.contains("nothing.parquet"));
        assert!(matches!(
            cache.load("nothing.parquet"),
            Err(DataError::CacheUnavailable(_))
        ));
    }

    #[test]
    fn load_corrupt_is_cache_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        fs::write(cache.path("junk.parquet"), b"not parquet at all").unwrap();

        assert!(matches!(
            cache.load("junk.parquet"),
            Err(DataError::CacheUnavailable(_))
        ));
    }

    #[test]
    fn empty_series_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let meta = CacheMeta::for_request("empty.parquet", &request(), &[]);

        cache.store("empty.parquet", &[], &meta).unwrap();
        assert!(cache.load("empty.parquet").unwrap().is_empty());
    }

    #[test]
    fn sidecar_records_request() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let series = vec![1.0, 2.0, 3.0];
        let meta = CacheMeta::for_request("eth.parquet", &request(), &series);

        cache.store("eth.parquet", &series, &meta).unwrap();
        let read = cache.get_meta("eth.parquet").unwrap();

        assert_eq!(read.symbol, "ETH-USD");
        assert_eq!(read.granularity_secs, 300);
        assert_eq!(read.sample_count, 3);
        assert_eq!(read.data_hash, hash_series(&series));
        assert_eq!(read.params_fingerprint, request().fingerprint());
        assert!(cache.get_meta("other.parquet").is_none());
    }

    #[test]
    fn second_store_replaces_data_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let first = vec![1.0, 2.0];
        let second = vec![5.0, 6.0, 7.0];

        let first_meta = CacheMeta::for_request("eth.parquet", &request(), &first);
        cache.store("eth.parquet", &first, &first_meta).unwrap();
        let second_meta = CacheMeta::for_request("eth.parquet", &request(), &second);
        cache.store("eth.parquet", &second, &second_meta).unwrap();

        let meta = cache.get_meta("eth.parquet").unwrap();
        assert_eq!(cache.load("eth.parquet").unwrap(), second);
        assert_eq!(meta.sample_count, 3);
        assert_eq!(meta.data_hash, hash_series(&second));
        assert!(!dir.path().join("eth.parquet.meta.json.tmp").exists());
    }

    #[test]
    fn failed_sidecar_swap_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        // A directory where the sidecar belongs cannot be replaced by a file.
        let blocker = cache.meta_path("eth.parquet");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();
        let series = vec![1.0, 2.0];
        let meta = CacheMeta::for_request("eth.parquet", &request(), &series);

        let err = cache.store("eth.parquet", &series, &meta).unwrap_err();

        assert!(matches!(err, DataError::CacheWrite(_)));
        assert!(!cache.contains("eth.parquet"));
        assert!(!dir.path().join("eth.parquet.tmp").exists());
        assert!(!dir.path().join("eth.parquet.meta.json.tmp").exists());
    }

    #[test]
    fn hash_distinguishes_values() {
        assert_eq!(hash_series(&[1.0, 2.0]), hash_series(&[1.0, 2.0]));
        assert_ne!(hash_series(&[1.0, 2.0]), hash_series(&[2.0, 1.0]));
    }
}
