use crate::alignment::{AlignedRecord, DateAligner};
use crate::cache::{CachedDataset, DatasetCache};
use crate::error::SkipReason;
use crate::features::{EngineeredFeatures, FeatureEngineer};
use crate::labels::generate_labels;
use crate::models::{round2, EngineeredRow, EntityOutcome, PriceBar, TickerDataset};
use crate::prices::PriceHistoryFetcher;
use crate::ratios::RatioExpander;
use crate::statements::{
    fundamental_schema, load_statements, StatementCategory, StatementLoader, StatementSet,
    FUNDAMENTAL_RATIO_COLUMNS,
};
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct DatasetOptions {
    pub min_aligned_rows: usize,
    pub min_report_year: i32,
    pub max_align_attempts: u32,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            min_aligned_rows: 50,
            min_report_year: 2000,
            max_align_attempts: 10,
        }
    }
}

/// Raw inputs of one entity, fetched but not yet engineered.
#[derive(Debug, Clone)]
pub struct FetchedEntity {
    pub ticker: String,
    pub statements: StatementSet,
    pub prices: Vec<PriceBar>,
}

#[derive(Debug, Clone)]
pub enum Prepared {
    Cached(TickerDataset),
    Fetched(FetchedEntity),
    Skipped(SkipReason),
}

/// Builds engineered per-ticker datasets, going through the cache first.
pub struct DatasetBuilder<L, F> {
    loader: L,
    fetcher: F,
    cache: DatasetCache,
    options: DatasetOptions,
}

impl<L: StatementLoader + Sync, F: PriceHistoryFetcher + Sync> DatasetBuilder<L, F> {
    pub fn new(loader: L, fetcher: F, cache: DatasetCache, options: DatasetOptions) -> Self {
        Self {
            loader,
            fetcher,
            cache,
            options,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Cache lookup followed, on a miss, by the upstream reads.
    pub async fn prepare(&self, ticker: &str, skip_downloading: bool) -> Prepared {
        match self.cache.load(ticker) {
            CachedDataset::Hit(dataset) => return Prepared::Cached(dataset),
            CachedDataset::Unreadable => return Prepared::Skipped(SkipReason::CacheUnreadable),
            CachedDataset::Miss if skip_downloading => {
                return Prepared::Skipped(SkipReason::NotCached)
            }
            CachedDataset::Miss => {}
        }

        let statements =
            match load_statements(&self.loader, ticker, self.options.min_report_year).await {
                Ok(statements) => statements,
                Err(err) => {
                    return Prepared::Skipped(SkipReason::UpstreamUnavailable(format!("{:#}", err)))
                }
            };

        let ratios = statements.count(StatementCategory::Ratios);
        if ratios < self.options.min_aligned_rows {
            return Prepared::Skipped(SkipReason::InsufficientData {
                found: ratios,
                required: self.options.min_aligned_rows,
            });
        }

        let prices = match self.fetcher.fetch(ticker).await {
            Ok(prices) if !prices.is_empty() => prices,
            Ok(_) => {
                return Prepared::Skipped(SkipReason::UpstreamUnavailable(
                    "empty price history".to_string(),
                ))
            }
            Err(err) => {
                return Prepared::Skipped(SkipReason::UpstreamUnavailable(format!("{:#}", err)))
            }
        };

        Prepared::Fetched(FetchedEntity {
            ticker: ticker.to_string(),
            statements,
            prices,
        })
    }

    /// Builds one ticker's dataset end to end.
    pub async fn build(&self, ticker: &str, skip_downloading: bool) -> EntityOutcome {
        let prepared = self.prepare(ticker, skip_downloading).await;
        let outcome = self.finish(prepared);
        self.persist(&outcome);
        outcome
    }

    /// Builds a chunk: upstream reads run concurrently, engineering runs in
    /// parallel once every read has completed.
    pub async fn build_chunk(
        &self,
        tickers: &[String],
        skip_downloading: bool,
    ) -> Vec<(String, EntityOutcome)> {
        let prepared = join_all(
            tickers
                .iter()
                .map(|ticker| self.prepare(ticker, skip_downloading)),
        )
        .await;

        let outcomes: Vec<EntityOutcome> = prepared
            .into_par_iter()
            .map(|prepared| self.finish(prepared))
            .collect();

        tickers
            .iter()
            .cloned()
            .zip(outcomes)
            .map(|(ticker, outcome)| {
                self.persist(&outcome);
                (ticker, outcome)
            })
            .collect()
    }

    fn finish(&self, prepared: Prepared) -> EntityOutcome {
        match prepared {
            Prepared::Cached(dataset) => EntityOutcome::Ready(dataset),
            Prepared::Skipped(reason) => EntityOutcome::Skipped(reason),
            Prepared::Fetched(entity) => engineer_entity(&entity, &self.options),
        }
    }

    fn persist(&self, outcome: &EntityOutcome) {
        let EntityOutcome::Ready(dataset) = outcome else {
            return;
        };
        match self.cache.store(dataset) {
            Ok(true) => debug!("{}: cached {} rows", dataset.ticker, dataset.len()),
            Ok(false) => {}
            Err(err) => warn!("{}: failed to cache dataset: {:#}", dataset.ticker, err),
        }
    }
}

/// Aligns, engineers, expands and labels one entity.
pub fn engineer_entity(entity: &FetchedEntity, options: &DatasetOptions) -> EntityOutcome {
    let ticker = entity.ticker.as_str();
    let aligner = DateAligner::new(options.max_align_attempts);
    let features = FeatureEngineer.engineer(&entity.prices);
    let alignment = aligner.align(entity.statements.merged(), &entity.prices);
    if !alignment.misses.is_empty() {
        debug!(
            "{}: {} report date(s) without a trading day",
            ticker,
            alignment.misses.len()
        );
    }

    let schema = fundamental_schema();
    let statistical_names: Vec<String> =
        features.statistical.column_names().map(String::from).collect();
    let technical_names: Vec<String> =
        features.technical.column_names().map(String::from).collect();
    let expanders = [
        RatioExpander::new(FUNDAMENTAL_RATIO_COLUMNS),
        RatioExpander::new(statistical_names),
        RatioExpander::new(technical_names),
    ];

    let mut assembled: Vec<(EngineeredRowSeed, BTreeMap<String, f64>)> = Vec::new();
    let mut incomplete = 0usize;
    for aligned in alignment.rows {
        let Some(mut values) = base_values(&aligned, &schema, &features) else {
            incomplete += 1;
            continue;
        };
        let mut ratios = BTreeMap::new();
        for expander in &expanders {
            expander.expand(&values, &mut ratios);
        }
        values.extend(ratios);
        assembled.push((
            EngineeredRowSeed {
                date: aligned.record.report_date,
                price_date: aligned.price_date,
                price: aligned.price,
            },
            values,
        ));
    }

    if assembled.len() < options.min_aligned_rows {
        debug!(
            "{}: {} complete aligned rows ({} incomplete)",
            ticker,
            assembled.len(),
            incomplete
        );
        return EntityOutcome::Skipped(SkipReason::InsufficientData {
            found: assembled.len(),
            required: options.min_aligned_rows,
        });
    }

    let feature_names: Vec<String> = assembled[0].1.keys().cloned().collect();
    let prices: Vec<f64> = assembled.iter().map(|(seed, _)| seed.price).collect();
    let labels = generate_labels(&prices);
    let rows = assembled
        .into_iter()
        .zip(labels)
        .map(|((seed, values), target)| EngineeredRow {
            date: seed.date,
            price_date: seed.price_date,
            price: round2(seed.price),
            features: feature_names
                .iter()
                .map(|name| round2(values.get(name).copied().unwrap_or(0.0)))
                .collect(),
            target,
        })
        .collect::<Vec<_>>();

    info!(
        "{}: engineered {} rows x {} features",
        ticker,
        rows.len(),
        feature_names.len()
    );
    EntityOutcome::Ready(TickerDataset {
        ticker: ticker.to_string(),
        feature_names,
        rows,
    })
}

/// Fundamental, statistical and technical values of one aligned row, or
/// `None` when any of them is missing or not finite.
fn base_values(
    aligned: &AlignedRecord,
    schema: &[&str],
    features: &EngineeredFeatures,
) -> Option<BTreeMap<String, f64>> {
    let mut values = BTreeMap::new();
    for field in schema {
        let value = aligned.record.values.get(*field).copied()?;
        if !value.is_finite() {
            return None;
        }
        values.insert((*field).to_string(), value);
    }
    for frame in [&features.statistical, &features.technical] {
        for (name, value) in frame.values_on(aligned.price_date)? {
            if !value.is_finite() {
                return None;
            }
            values.insert(name.to_string(), value);
        }
    }
    Some(values)
}

struct EngineeredRowSeed {
    date: NaiveDate,
    price_date: NaiveDate,
    price: f64,
}
