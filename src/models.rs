use crate::error::{ModelError, SkipReason};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column names delivered by the price source. Derived feature columns that
/// reuse one of these names are dropped so they cannot shadow raw data.
pub const RAW_PRICE_COLUMNS: [&str; 13] = [
    "date",
    "open",
    "high",
    "low",
    "close",
    "adjClose",
    "volume",
    "unadjustedVolume",
    "change",
    "changePercent",
    "vwap",
    "label",
    "changeOverTime",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub adj_close: Option<f64>,
    #[serde(default)]
    pub vwap: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            adj_close: None,
            vwap: None,
            change_percent: None,
        }
    }
}

/// Rounds to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = (value * 100.0).round_ties_even() / 100.0;
    if scaled == 0.0 {
        0.0
    } else {
        scaled
    }
}

/// Sorts bars ascending by date and keeps the first bar seen for each date.
pub fn normalize_price_series(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by(|a, b| a.date.cmp(&b.date));
    bars.dedup_by(|later, earlier| later.date == earlier.date);
    bars
}

/// One dated record of numeric fundamental fields. After merging, a record
/// holds the fields of every statement category reported on that date.
#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalRecord {
    pub entity_id: String,
    pub report_date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl FundamentalRecord {
    pub fn new(entity_id: impl Into<String>, report_date: NaiveDate) -> Self {
        Self {
            entity_id: entity_id.into(),
            report_date,
            values: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRow {
    /// Report date of the fundamental record.
    pub date: NaiveDate,
    /// Trading date the record was aligned to.
    pub price_date: NaiveDate,
    pub price: f64,
    /// Values in the order of `TickerDataset::feature_names`.
    pub features: Vec<f64>,
    /// `None` on the live (most recent) row.
    pub target: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerDataset {
    pub ticker: String,
    pub feature_names: Vec<String>,
    pub rows: Vec<EngineeredRow>,
}

impl TickerDataset {
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            feature_names: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn labeled_len(&self) -> usize {
        self.rows.iter().filter(|row| row.target.is_some()).count()
    }

    pub fn to_frame(&self) -> LabeledFrame {
        LabeledFrame {
            feature_names: self.feature_names.clone(),
            dates: self.rows.iter().map(|row| row.date).collect(),
            features: self.rows.iter().map(|row| row.features.clone()).collect(),
            targets: self.rows.iter().map(|row| row.target).collect(),
        }
    }
}

/// Feature matrix with aligned dates and labels, the shape consumed by the
/// splitter, the selector and the predictor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledFrame {
    pub feature_names: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<Option<u8>>,
}

impl LabeledFrame {
    pub fn with_columns(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn labeled_len(&self) -> usize {
        self.targets.iter().filter(|target| target.is_some()).count()
    }

    pub fn push_row(&mut self, date: NaiveDate, features: Vec<f64>, target: Option<u8>) {
        self.dates.push(date);
        self.features.push(features);
        self.targets.push(target);
    }

    /// Rows `[start, end)` in their current order.
    pub fn slice(&self, start: usize, end: usize) -> LabeledFrame {
        let end = end.min(self.len());
        let start = start.min(end);
        LabeledFrame {
            feature_names: self.feature_names.clone(),
            dates: self.dates[start..end].to_vec(),
            features: self.features[start..end].to_vec(),
            targets: self.targets[start..end].to_vec(),
        }
    }

    /// Only rows that carry a label.
    pub fn labeled(&self) -> LabeledFrame {
        let mut out = LabeledFrame::with_columns(self.feature_names.clone());
        for idx in 0..self.len() {
            if self.targets[idx].is_some() {
                out.push_row(self.dates[idx], self.features[idx].clone(), self.targets[idx]);
            }
        }
        out
    }

    /// Appends another frame. Both frames must carry the same columns.
    pub fn append(&mut self, other: LabeledFrame) -> Result<()> {
        if self.feature_names.is_empty() && self.is_empty() {
            self.feature_names = other.feature_names;
        } else if self.feature_names != other.feature_names {
            return Err(anyhow!(
                "cannot append frame with {} columns to frame with {} columns",
                other.feature_names.len(),
                self.feature_names.len()
            ));
        }
        self.dates.extend(other.dates);
        self.features.extend(other.features);
        self.targets.extend(other.targets);
        Ok(())
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.features.iter().map(|row| row[idx]).collect()
    }

    /// Rows as a dense `len x columns` matrix.
    pub fn to_matrix(&self) -> Result<Array2<f64>, ModelError> {
        let width = self.feature_names.len();
        if let Some(row) = self.features.iter().find(|row| row.len() != width) {
            return Err(ModelError::DimensionMismatch {
                expected: width,
                got: row.len(),
            });
        }
        Ok(Array2::from_shape_fn((self.len(), width), |(i, j)| self.features[i][j]))
    }

    /// Targets of the labeled rows, in row order.
    pub fn label_array(&self) -> Array1<u8> {
        self.targets.iter().flatten().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationMetrics {
    pub accuracy: u8,
    pub precision: u8,
    #[serde(rename = "f1_score")]
    pub f1: u8,
    #[serde(rename = "recall_score")]
    pub recall: u8,
    #[serde(rename = "roc_auc_score")]
    pub roc_auc: u8,
    pub score: Option<u8>,
}

/// Result of preparing one entity for training or scoring.
#[derive(Debug, Clone)]
pub enum EntityOutcome {
    Ready(TickerDataset),
    Skipped(SkipReason),
}

impl EntityOutcome {
    pub fn into_dataset(self) -> std::result::Result<TickerDataset, SkipReason> {
        match self {
            EntityOutcome::Ready(dataset) => Ok(dataset),
            EntityOutcome::Skipped(reason) => Err(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    #[test]
    fn normalize_price_series_sorts_and_dedups() {
        let bars = vec![
            PriceBar::new(day(3), 1.0, 1.0, 1.0, 3.0, 10.0),
            PriceBar::new(day(1), 1.0, 1.0, 1.0, 1.0, 10.0),
            PriceBar::new(day(3), 1.0, 1.0, 1.0, 99.0, 10.0),
            PriceBar::new(day(2), 1.0, 1.0, 1.0, 2.0, 10.0),
        ];
        let normalized = normalize_price_series(bars);
        let closes: Vec<f64> = normalized.iter().map(|bar| bar.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn round2_rounds_half_to_even() {
        assert_eq!(round2(1.125), 1.12);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(-0.001), 0.0);
        assert!(round2(f64::NAN).is_nan());
    }

    #[test]
    fn matrix_view_keeps_rows_and_skips_live_label() {
        let mut frame = LabeledFrame::with_columns(vec!["a".into(), "b".into()]);
        frame.push_row(day(1), vec![1.0, 2.0], Some(1));
        frame.push_row(day(2), vec![3.0, 4.0], None);
        assert_eq!(frame.to_matrix().unwrap(), ndarray::array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(frame.label_array(), ndarray::array![1]);

        frame.push_row(day(3), vec![5.0], Some(0));
        assert!(matches!(
            frame.to_matrix(),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn append_requires_matching_columns() {
        let mut left = LabeledFrame::default();
        let mut right = LabeledFrame::with_columns(vec!["a".into()]);
        right.push_row(day(1), vec![1.0], Some(0));
        left.append(right.clone()).unwrap();
        assert_eq!(left.len(), 1);

        let other = LabeledFrame::with_columns(vec!["b".into()]);
        assert!(left.append(other).is_err());
    }
}
