//! The parameters of one historic fetch.

use super::provider::DataError;
use chrono::{Duration, NaiveDateTime};

/// Symbol, extracted column, `[start, end)` range and bucket width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    /// Offset of the retained field within each sample (3 = open on Coinbase).
    pub column: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Duration,
}

impl FetchRequest {
    /// Check `start < end` and `granularity > 0`.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.start >= self.end {
            return Err(DataError::InvalidRange(format!(
                "start {} is not before end {}",
                self.start, self.end
            )));
        }
        if self.granularity <= Duration::zero() {
            return Err(DataError::InvalidRange(format!(
                "granularity must be positive, got {}s",
                self.granularity.num_seconds()
            )));
        }
        if self.granularity.subsec_nanos() != 0 {
            return Err(DataError::InvalidRange(
                "granularity must be a whole number of seconds".into(),
            ));
        }
        Ok(())
    }

    pub fn granularity_secs(&self) -> i64 {
        self.granularity.num_seconds()
    }

    /// Number of buckets in `[start, end)`, counting a trailing partial bucket.
    pub fn expected_samples(&self) -> usize {
        let span = (self.end - self.start).num_seconds();
        let step = self.granularity_secs();
        if span <= 0 || step <= 0 {
            return 0;
        }
        ((span + step - 1) / step) as usize
    }

    /// BLAKE3 digest of every parameter that shapes the series.
    ///
    /// Stored beside a cache entry for diagnostics only; the cache is keyed by
    /// filename, not by this value.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            self.symbol,
            self.column,
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S"),
            self.granularity_secs()
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn request() -> FetchRequest {
        FetchRequest {
            symbol: "ETH-USD".into(),
            column: 3,
            start: at(0, 0),
            end: at(9, 0),
            granularity: Duration::minutes(5),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
        assert_eq!(request().granularity_secs(), 300);
        assert_eq!(request().expected_samples(), 108);
    }

    #[test]
    fn rejects_empty_or_inverted_range() {
        let mut r = request();
        r.end = r.start;
        assert!(matches!(r.validate(), Err(DataError::InvalidRange(_))));

        r.end = at(0, 0);
        r.start = at(1, 0);
        assert!(matches!(r.validate(), Err(DataError::InvalidRange(_))));
    }

    #[test]
    fn rejects_non_positive_granularity() {
        let mut r = request();
        r.granularity = Duration::zero();
        assert!(r.validate().is_err());
        r.granularity = Duration::minutes(-5);
        assert!(r.validate().is_err());
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let a = request();
        let mut b = request();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.granularity = Duration::minutes(15);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
