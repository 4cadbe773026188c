use crate::models::{normalize_price_series, PriceBar};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const FMP_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
pub const HISTORY_START: &str = "1995-10-10";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Daily price history for one ticker, ascending and unique per date.
#[allow(async_fn_in_trait)]
pub trait PriceHistoryFetcher {
    async fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>>;
}

/// Payload shape of the historical-price-full endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoricalPriceResponse {
    #[serde(default)]
    pub historical: Vec<PriceBar>,
}

pub fn build_http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build HTTP client")
}

pub struct HttpPriceFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPriceFetcher {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(Duration::from_secs(30)))?,
            base_url: FMP_BASE_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn history_url(&self, ticker: &str) -> String {
        format!(
            "{}/historical-price-full/{}?from={}&apikey={}",
            self.base_url, ticker, HISTORY_START, self.api_key
        )
    }
}

impl PriceHistoryFetcher for HttpPriceFetcher {
    async fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        let response = self
            .client
            .get(self.history_url(ticker))
            .send()
            .await
            .with_context(|| format!("price request for {} failed", ticker))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(anyhow!(
                "price request for {} returned {}: {}",
                ticker,
                status,
                snippet
            ));
        }

        let payload: HistoricalPriceResponse = response
            .json()
            .await
            .with_context(|| format!("invalid price payload for {}", ticker))?;
        Ok(normalize_price_series(payload.historical))
    }
}

/// Reads `{dir}/{ticker}.json` files shaped like the HTTP payload.
#[derive(Debug, Clone)]
pub struct JsonFilePriceFetcher {
    dir: PathBuf,
}

impl JsonFilePriceFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PriceHistoryFetcher for JsonFilePriceFetcher {
    async fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        let path = self.dir.join(format!("{}.json", ticker));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let payload: HistoricalPriceResponse = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid price JSON in {}", path.display()))?;
        Ok(normalize_price_series(payload.historical))
    }
}

/// Price source picked at startup.
pub enum PriceSource {
    Http(HttpPriceFetcher),
    Files(JsonFilePriceFetcher),
    /// Cached datasets only; every fetch fails.
    Offline,
}

impl PriceHistoryFetcher for PriceSource {
    async fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        match self {
            PriceSource::Http(fetcher) => fetcher.fetch(ticker).await,
            PriceSource::Files(fetcher) => fetcher.fetch(ticker).await,
            PriceSource::Offline => Err(anyhow!(
                "price downloads are disabled, no history for {}",
                ticker
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descending_payload_into_ascending_bars() {
        let raw = r#"{
            "symbol": "AAA",
            "historical": [
                {"date": "2020-01-03", "open": 1, "high": 2, "low": 0.5, "close": 1.5,
                 "adjClose": 1.5, "volume": 100, "unadjustedVolume": 100, "change": 0.1,
                 "changePercent": 1.2, "vwap": 1.3, "label": "January 03, 20", "changeOverTime": 0.01},
                {"date": "2020-01-02", "open": 1, "high": 2, "low": 0.5, "close": 1.25, "volume": 90}
            ]
        }"#;
        let payload: HistoricalPriceResponse = serde_json::from_str(raw).unwrap();
        let bars = normalize_price_series(payload.historical);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.25);
        assert_eq!(bars[1].change_percent, Some(1.2));
    }

    #[test]
    fn empty_payload_yields_no_bars() {
        let payload: HistoricalPriceResponse = serde_json::from_str("{}").unwrap();
        assert!(payload.historical.is_empty());
    }

    #[tokio::test]
    async fn file_fetcher_reads_ticker_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AAA.json"),
            r#"{"historical":[{"date":"2021-05-03","open":1,"high":1,"low":1,"close":2,"volume":3}]}"#,
        )
        .unwrap();
        let fetcher = JsonFilePriceFetcher::new(dir.path());
        let bars = fetcher.fetch("AAA").await.unwrap();
        assert_eq!(bars.len(), 1);
        assert!(fetcher.fetch("BBB").await.is_err());
    }
}
