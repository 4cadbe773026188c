use anyhow::{Context, Result};
use log::{error, info};
use std::collections::BTreeSet;
use tokio_postgres::{Client, NoTls};

/// Large-cap names the shared warm-start model is trained on.
pub const WARM_START_SYMBOLS: &[&str] = &[
    "APO", "UNM", "CVS", "SAVE", "SIRI", "EA", "TTWO", "NTDOY", "GRC", "ODP", "IMAX", "YUM",
    "UPS", "FI", "DE", "MDT", "INFY", "ICE", "SNY", "HON", "BSX", "C", "ADP", "CB", "LOW", "PFE",
    "RTX", "DIS", "MS", "BHP", "BAC", "PG", "BABA", "ACN", "TMO", "LLY", "XOM", "JPM", "UNH",
    "COST", "HD", "ASML", "BRK-A", "BRK-B", "CAT", "TT", "SAP", "APH", "NOG", "DVN", "COP", "OXY",
    "MRO", "MU", "AVGO", "INTC", "LRCX", "PLD", "AMT", "JNJ", "TSM", "V", "ORCL", "MA", "BA",
    "NFLX", "ADBE", "IBM", "GME", "NKE", "ANGO", "PNW", "SHEL", "WMT", "BUD", "AMZN", "PEP",
    "AMD", "NVDA", "AWR", "TM", "AAPL", "GOOGL", "META", "MSFT", "LMT", "TSLA", "DOV", "KO",
];

/// Sorted, de-duplicated warm-start universe.
pub fn warm_start_universe() -> Vec<String> {
    WARM_START_SYMBOLS
        .iter()
        .map(|symbol| symbol.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Common shares only: no class suffixes or preferred series.
pub fn is_plain_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && !symbol.contains('.') && !symbol.contains('-')
}

/// Upper-cased, de-duplicated symbols from a comma separated list.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_ascii_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Read access to the ticker metadata table.
pub struct UniverseStore {
    client: Client,
}

impl UniverseStore {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    /// Plain symbols with market capitalization of at least `min_market_cap`.
    pub async fn symbols_with_min_market_cap(&self, min_market_cap: f64) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT symbol FROM tickers \
                 WHERE market_cap::float8 >= $1 \
                   AND symbol NOT LIKE '%.%' \
                   AND symbol NOT LIKE '%-%' \
                 ORDER BY symbol",
                &[&min_market_cap],
            )
            .await
            .context("Failed to query ticker universe")?;
        let symbols: Vec<String> = rows
            .iter()
            .map(|row| row.get::<_, String>(0))
            .filter(|symbol| is_plain_symbol(symbol))
            .collect();
        info!(
            "Loaded {} symbols with market cap >= {:.0}",
            symbols.len(),
            min_market_cap
        );
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_start_universe_is_sorted_and_unique() {
        let universe = warm_start_universe();
        assert!(universe.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(universe.contains(&"AAPL".to_string()));
        assert!(universe.contains(&"BRK-B".to_string()));
    }

    #[test]
    fn plain_symbol_filter() {
        assert!(is_plain_symbol("AAPL"));
        assert!(!is_plain_symbol("BRK-B"));
        assert!(!is_plain_symbol("RDS.A"));
        assert!(!is_plain_symbol(""));
    }

    #[test]
    fn symbol_list_parsing() {
        assert_eq!(parse_symbol_list(" msft, AAPL,,msft "), vec!["AAPL", "MSFT"]);
    }
}
