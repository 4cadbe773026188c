#![allow(dead_code)]

use ai_score::cache::DatasetCache;
use ai_score::dataset::{DatasetBuilder, DatasetOptions};
use ai_score::models::PriceBar;
use ai_score::prices::PriceHistoryFetcher;
use ai_score::statements::{StatementCategory, StatementLoader};
use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Weekday bars from 2004 onwards with a trend, a slow cycle and a fast
/// wobble so that consecutive closes move in both directions.
pub fn synthetic_prices(seed: f64, days: i64) -> Vec<PriceBar> {
    let start = date(2004, 1, 2);
    let mut bars = Vec::new();
    let mut previous_close = 100.0 + seed;
    let mut i = 0usize;
    for offset in 0..days {
        let day = start + Duration::days(offset);
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let t = i as f64;
        let close = 100.0
            + seed
            + t * 0.01
            + 10.0 * (t / 40.0 + seed).sin()
            + 1.5 * (t * 1.7 + seed).sin();
        let volume = 1_000_000.0 + ((i * 37) % 17) as f64 * 10_000.0 + seed * 1000.0;
        bars.push(PriceBar::new(
            day,
            previous_close,
            close.max(previous_close) * 1.01,
            close.min(previous_close) * 0.99,
            close,
            volume,
        ));
        previous_close = close;
        i += 1;
    }
    bars
}

/// Calendar quarter ends starting in 2006.
pub fn quarter_ends(count: usize) -> Vec<NaiveDate> {
    (0..count)
        .map(|q| {
            let year = 2006 + (q / 4) as i32;
            match q % 4 {
                0 => date(year, 3, 31),
                1 => date(year, 6, 30),
                2 => date(year, 9, 30),
                _ => date(year, 12, 31),
            }
        })
        .collect()
}

/// Raw statement records carrying every known field of the category.
pub fn statement_records(category: StatementCategory, quarters: usize, seed: f64) -> Vec<Value> {
    quarter_ends(quarters)
        .into_iter()
        .enumerate()
        .map(|(q, report_date)| {
            let mut object = Map::new();
            object.insert("date".into(), json!(report_date.format("%Y-%m-%d").to_string()));
            object.insert("symbol".into(), json!("TEST"));
            object.insert("period".into(), json!("Q1"));
            for (f, field) in category.fields().iter().enumerate() {
                let value = 1.0 + ((q * 7 + f * 3) % 13) as f64 * 0.5 + q as f64 * 0.01 + seed;
                object.insert((*field).to_string(), json!(value));
            }
            Value::Object(object)
        })
        .collect()
}

#[derive(Default)]
pub struct InMemoryStatements {
    records: BTreeMap<(String, StatementCategory), Vec<Value>>,
}

impl InMemoryStatements {
    pub fn with_ticker(mut self, ticker: &str, quarters: usize, seed: f64) -> Self {
        for category in StatementCategory::ALL {
            self.records.insert(
                (ticker.to_string(), category),
                statement_records(category, quarters, seed),
            );
        }
        self
    }

    pub fn with_short_ratios(mut self, ticker: &str, quarters: usize, ratios: usize) -> Self {
        self = self.with_ticker(ticker, quarters, 0.0);
        self.records.insert(
            (ticker.to_string(), StatementCategory::Ratios),
            statement_records(StatementCategory::Ratios, ratios, 0.0),
        );
        self
    }
}

impl StatementLoader for InMemoryStatements {
    async fn load_raw(&self, ticker: &str, category: StatementCategory) -> Result<Vec<Value>> {
        self.records
            .get(&(ticker.to_string(), category))
            .cloned()
            .ok_or_else(|| anyhow!("no {} statements for {}", category.dir_name(), ticker))
    }
}

#[derive(Default)]
pub struct InMemoryPrices {
    bars: HashMap<String, Vec<PriceBar>>,
    calls: AtomicUsize,
}

impl InMemoryPrices {
    pub fn with_ticker(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.bars.insert(ticker.to_string(), bars);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceHistoryFetcher for InMemoryPrices {
    async fn fetch(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bars
            .get(ticker)
            .cloned()
            .ok_or_else(|| anyhow!("no price history for {}", ticker))
    }
}

pub const QUARTERS: usize = 60;
pub const PRICE_DAYS: i64 = 365 * 18;

pub fn test_options() -> DatasetOptions {
    DatasetOptions {
        min_aligned_rows: 20,
        ..DatasetOptions::default()
    }
}

/// Builder over two well-formed tickers (AAA, BBB), one ticker without
/// statements (NOSTMT) and one with too few ratio records (SHORT).
pub fn fixture_builder(cache_dir: &Path) -> DatasetBuilder<InMemoryStatements, InMemoryPrices> {
    let statements = InMemoryStatements::default()
        .with_ticker("AAA", QUARTERS, 0.0)
        .with_ticker("BBB", QUARTERS, 1.5)
        .with_short_ratios("SHORT", QUARTERS, 5);
    let prices = InMemoryPrices::default()
        .with_ticker("AAA", synthetic_prices(0.0, PRICE_DAYS))
        .with_ticker("BBB", synthetic_prices(3.0, PRICE_DAYS))
        .with_ticker("NOSTMT", synthetic_prices(1.0, PRICE_DAYS))
        .with_ticker("SHORT", synthetic_prices(2.0, PRICE_DAYS));
    DatasetBuilder::new(statements, prices, DatasetCache::new(cache_dir), test_options())
}
