use crate::error::SkipReason;
use log::{info, warn};
use std::collections::BTreeMap;

/// Per-batch tally of processed tickers and skip reasons.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    name: String,
    processed: Vec<String>,
    published: Vec<String>,
    skipped: BTreeMap<&'static str, Vec<(String, String)>>,
}

impl BatchReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn record_processed(&mut self, ticker: &str) {
        self.processed.push(ticker.to_string());
    }

    pub fn record_published(&mut self, ticker: &str) {
        self.published.push(ticker.to_string());
    }

    pub fn record_skip(&mut self, ticker: &str, reason: &SkipReason) {
        self.skipped
            .entry(reason.label())
            .or_default()
            .push((ticker.to_string(), reason.to_string()));
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn published_count(&self) -> usize {
        self.published.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.values().map(Vec::len).sum()
    }

    /// Skip counts keyed by `SkipReason::label`.
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        self.skipped
            .iter()
            .map(|(label, entries)| (*label, entries.len()))
            .collect()
    }

    pub fn skipped_tickers(&self, label: &str) -> Vec<&str> {
        self.skipped
            .get(label)
            .map(|entries| entries.iter().map(|(ticker, _)| ticker.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        info!(
            "{}: {} processed, {} published, {} skipped",
            self.name,
            self.processed_count(),
            self.published_count(),
            self.skipped_count()
        );
        for (label, entries) in &self.skipped {
            warn!("{}: {} skipped as {}", self.name, entries.len(), label);
            for (ticker, detail) in entries.iter().take(5) {
                warn!("  {} ({})", ticker, detail);
            }
        }
    }
}
