use crate::indicators::*;
use crate::models::{PriceBar, RAW_PRICE_COLUMNS};
use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Named, date-keyed columns computed over a full price history.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl FeatureFrame {
    fn new(dates: Vec<NaiveDate>) -> Self {
        let index = dates
            .iter()
            .enumerate()
            .map(|(idx, date)| (*date, idx))
            .collect();
        Self {
            dates,
            index,
            columns: BTreeMap::new(),
        }
    }

    /// Adds a column unless its name shadows a raw price column.
    fn insert(&mut self, name: &str, values: Vec<f64>) {
        if RAW_PRICE_COLUMNS.contains(&name) {
            debug!("Dropping derived column {} (collides with price data)", name);
            return;
        }
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.insert(name.to_string(), values);
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Values of every column on `date`, joined by trading date.
    pub fn values_on(&self, date: NaiveDate) -> Option<BTreeMap<&str, f64>> {
        let idx = *self.index.get(&date)?;
        Some(
            self.columns
                .iter()
                .map(|(name, values)| (name.as_str(), values[idx]))
                .collect(),
        )
    }
}

/// Both derived families for one entity.
#[derive(Debug, Clone, Default)]
pub struct EngineeredFeatures {
    pub statistical: FeatureFrame,
    pub technical: FeatureFrame,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Computes both families over the whole history. `bars` must be
    /// ascending and unique per date.
    pub fn engineer(&self, bars: &[PriceBar]) -> EngineeredFeatures {
        EngineeredFeatures {
            statistical: statistical_features(bars),
            technical: technical_features(bars),
        }
    }
}

struct PriceColumns {
    dates: Vec<NaiveDate>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl PriceColumns {
    fn from_bars(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars.iter().map(|bar| bar.date).collect(),
            highs: bars.iter().map(|bar| bar.high).collect(),
            lows: bars.iter().map(|bar| bar.low).collect(),
            closes: bars.iter().map(|bar| bar.close).collect(),
            volumes: bars.iter().map(|bar| bar.volume).collect(),
        }
    }
}

fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < lag || values[i - lag] == 0.0 {
                f64::NAN
            } else {
                values[i] / values[i - lag] - 1.0
            }
        })
        .collect()
}

fn zscore(values: &[f64], period: usize) -> Vec<f64> {
    let mean = calculate_sma(values, period);
    let std = rolling_std(values, period, 1);
    (0..values.len())
        .map(|i| {
            if std[i] > 0.0 {
                (values[i] - mean[i]) / std[i]
            } else if std[i] == 0.0 {
                0.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

pub fn statistical_features(bars: &[PriceBar]) -> FeatureFrame {
    let cols = PriceColumns::from_bars(bars);
    let closes = &cols.closes;
    let mut frame = FeatureFrame::new(cols.dates.clone());

    let log_returns: Vec<f64> = (0..closes.len())
        .map(|i| {
            if i == 0 || closes[i - 1] <= 0.0 || closes[i] <= 0.0 {
                f64::NAN
            } else {
                (closes[i] / closes[i - 1]).ln()
            }
        })
        .collect();

    frame.insert("return_1", pct_change(closes, 1));
    frame.insert("return_5", pct_change(closes, 5));
    frame.insert("return_20", pct_change(closes, 20));
    frame.insert("log_return_1", log_returns.clone());
    for period in [5, 20, 60] {
        frame.insert(&format!("rolling_mean_{}", period), calculate_sma(closes, period));
    }
    for period in [20, 60] {
        frame.insert(&format!("rolling_std_{}", period), rolling_std(closes, period, 1));
    }

    let annualization = 252f64.sqrt();
    let volatility: Vec<f64> = rolling_std(&log_returns, 20, 1)
        .into_iter()
        .map(|sd| sd * annualization)
        .collect();
    frame.insert("volatility_20", volatility);

    let (skew, kurtosis) = rolling_moments(&log_returns, 60);
    frame.insert("skew_60", skew);
    frame.insert("kurtosis_60", kurtosis);
    frame.insert("zscore_20", zscore(closes, 20));

    let peak = rolling_max(closes, 252);
    frame.insert(
        "drawdown_252",
        closes.iter().zip(&peak).map(|(c, p)| c / p - 1.0).collect(),
    );

    let high_60 = rolling_max(closes, 60);
    let low_60 = rolling_min(closes, 60);
    let range_position = (0..closes.len())
        .map(|i| {
            let range = high_60[i] - low_60[i];
            if range > 0.0 {
                (closes[i] - low_60[i]) / range
            } else if range == 0.0 {
                0.5
            } else {
                f64::NAN
            }
        })
        .collect();
    frame.insert("range_position_60", range_position);
    frame.insert("volume_zscore_20", zscore(&cols.volumes, 20));

    let high_52w = rolling_max(&cols.highs, 252);
    frame.insert(
        "close_to_high_52w",
        closes.iter().zip(&high_52w).map(|(c, h)| c / h).collect(),
    );

    frame
}

pub fn technical_features(bars: &[PriceBar]) -> FeatureFrame {
    let cols = PriceColumns::from_bars(bars);
    let (highs, lows, closes, volumes) = (&cols.highs, &cols.lows, &cols.closes, &cols.volumes);
    let mut frame = FeatureFrame::new(cols.dates.clone());

    frame.insert("sma_20", calculate_sma(closes, 20));
    frame.insert("sma_50", calculate_sma(closes, 50));
    frame.insert("ema_12", calculate_ema(closes, 12));
    frame.insert("ema_26", calculate_ema(closes, 26));

    let macd = calculate_macd(closes, 12, 26, 9);
    frame.insert("macd", macd.macd);
    frame.insert("macd_signal", macd.signal);
    frame.insert("macd_hist", macd.histogram);
    frame.insert("rsi_14", calculate_rsi(closes, 14));

    let bands = calculate_bollinger_bands(closes, 20, 2.0);
    let width = (0..closes.len())
        .map(|i| {
            if bands.middle[i] != 0.0 {
                (bands.upper[i] - bands.lower[i]) / bands.middle[i]
            } else {
                f64::NAN
            }
        })
        .collect();
    frame.insert("bb_upper", bands.upper);
    frame.insert("bb_lower", bands.lower);
    frame.insert("bb_width", width);

    let adx = calculate_adx(highs, lows, closes, 14);
    frame.insert("adx", adx.adx);
    frame.insert("pdi", adx.pdi);
    frame.insert("mdi", adx.mdi);
    frame.insert("atr_14", calculate_atr(highs, lows, closes, 14));
    frame.insert("williams_r_14", calculate_williams_r(highs, lows, closes, 14));

    let stochastic = calculate_stochastic(highs, lows, closes, 14, 3);
    frame.insert("stoch_k", stochastic.k);
    frame.insert("stoch_d", stochastic.d);
    frame.insert("cci_20", calculate_cci(highs, lows, closes, 20));
    frame.insert("roc_10", calculate_roc(closes, 10));
    frame.insert("mfi_14", calculate_mfi(highs, lows, closes, volumes, 14));
    frame.insert("obv", calculate_obv(closes, volumes));
    frame.insert("adl", calculate_adl(highs, lows, closes, volumes));

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bars(count: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                let close = 50.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
                PriceBar::new(
                    start + Duration::days(i as i64),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1_000.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn derived_columns_never_shadow_raw_columns() {
        let features = FeatureEngineer.engineer(&bars(300));
        for frame in [&features.statistical, &features.technical] {
            for name in frame.column_names() {
                assert!(!RAW_PRICE_COLUMNS.contains(&name), "{} collides", name);
            }
        }
        assert!(features.technical.column("obv").is_some());
    }

    #[test]
    fn insert_drops_names_of_price_columns() {
        let history = bars(3);
        let mut frame = FeatureFrame::new(history.iter().map(|bar| bar.date).collect());
        frame.insert("vwap", vec![1.0, 2.0, 3.0]);
        frame.insert("close", vec![1.0, 2.0, 3.0]);
        frame.insert("close_ratio", vec![1.0, 2.0, 3.0]);
        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["close_ratio"]);
    }

    #[test]
    fn values_on_joins_by_date() {
        let history = bars(300);
        let frame = statistical_features(&history);
        let last = history[299].date;
        let values = frame.values_on(last).unwrap();
        let expected = history[299].close / history[298].close - 1.0;
        assert!((values["return_1"] - expected).abs() < 1e-12);
        assert!(values["drawdown_252"].is_finite());
        assert!(frame
            .values_on(last + Duration::days(1))
            .is_none());
    }
}
