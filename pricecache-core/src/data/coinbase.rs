//! Coinbase Exchange historic-rates client.
//!
//! `GET {base_url}/products/{symbol}/candles?start=..&end=..&granularity=..`
//! answers with `[[time, low, high, open, close, volume], ...]`, newest first,
//! or with `{"message": ...}` on rejection. Throttling is signalled by the
//! message text, so the HTTP status is not inspected.

use super::provider::{DataError, HistoricRates, HistoricRatesSource};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Blocking HTTP client for the public candles endpoint.
pub struct CoinbaseClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pricecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the candles URL for a product.
    fn candles_url(&self, symbol: &str) -> String {
        format!("{}/products/{symbol}/candles", self.base_url)
    }
}

impl HistoricRatesSource for CoinbaseClient {
    fn name(&self) -> &str {
        "coinbase_exchange"
    }

    fn get_historic_rates(
        &self,
        symbol: &str,
        start: &str,
        end: &str,
        granularity_secs: i64,
    ) -> Result<HistoricRates, DataError> {
        let url = self.candles_url(symbol);
        debug!(%url, %start, %end, granularity_secs, "GET candles");

        let body = self
            .client
            .get(&url)
            .query(&[
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("granularity", granularity_secs.to_string()),
            ])
            .send()
            .and_then(|resp| resp.text())
            .map_err(|e| DataError::Transport(e.to_string()))?;

        HistoricRates::from_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candles_url_strips_trailing_slash() {
        let client = CoinbaseClient::with_base_url("http://localhost:9999/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9999");
        assert_eq!(
            client.candles_url("ETH-USD"),
            "http://localhost:9999/products/ETH-USD/candles"
        );
    }

    #[test]
    fn unreachable_host_is_transient() {
        // Port 1 on loopback refuses connections.
        let client = CoinbaseClient::with_base_url("http://127.0.0.1:1").unwrap();
        let err = client
            .get_historic_rates("ETH-USD", "2016-06-01T00:00:00", "2016-06-01T08:20:00", 300)
            .unwrap_err();
        assert!(matches!(err, DataError::Transport(_)));
        assert!(err.is_transient());
    }
}
