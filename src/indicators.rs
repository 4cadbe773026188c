//! Indicator math over daily price columns.
//!
//! Every function returns a series aligned with its input: element `i` is
//! the indicator value at bar `i`, and bars inside the warm-up window hold
//! `f64::NAN`.

use statrs::statistics::Statistics;

pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    let mut sma_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return sma_values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values[period - 1] = window_sum / period as f64;
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values[i] = window_sum / period as f64;
    }

    sma_values
}

/// Exponential moving average seeded with the first price.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdOutput {
    let fast_ema = calculate_ema(prices, fast_period);
    let slow_ema = calculate_ema(prices, slow_period);

    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(fast, slow)| fast - slow)
        .collect();
    let signal = calculate_ema(&macd, signal_period);
    let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

    MacdOutput {
        macd,
        signal,
        histogram,
    }
}

pub struct AdxOutput {
    pub adx: Vec<f64>,
    pub pdi: Vec<f64>,
    pub mdi: Vec<f64>,
}

/// Directional movement index. DI values are window sums over `period` bars;
/// ADX is the `period`-bar average of DX.
pub fn calculate_adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> AdxOutput {
    let len = closes.len();
    let mut out = AdxOutput {
        adx: vec![f64::NAN; len],
        pdi: vec![f64::NAN; len],
        mdi: vec![f64::NAN; len],
    };
    if period == 0 || len < period + 1 {
        return out;
    }

    let mut tr_values = vec![0.0; len];
    let mut dm_plus_values = vec![0.0; len];
    let mut dm_minus_values = vec![0.0; len];
    for i in 1..len {
        tr_values[i] = true_range(highs[i], lows[i], closes[i - 1]);

        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        if up_move > down_move && up_move > 0.0 {
            dm_plus_values[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            dm_minus_values[i] = down_move;
        }
    }

    let mut dx_values = vec![f64::NAN; len];
    for i in period..len {
        let window = (i + 1 - period)..=i;
        let tr_sum: f64 = tr_values[window.clone()].iter().sum();
        let dm_plus_sum: f64 = dm_plus_values[window.clone()].iter().sum();
        let dm_minus_sum: f64 = dm_minus_values[window].iter().sum();

        let (di_plus, di_minus) = if tr_sum > 0.0 {
            (dm_plus_sum / tr_sum * 100.0, dm_minus_sum / tr_sum * 100.0)
        } else {
            (0.0, 0.0)
        };
        out.pdi[i] = di_plus;
        out.mdi[i] = di_minus;

        let di_sum = di_plus + di_minus;
        dx_values[i] = if di_sum > 0.0 {
            (di_plus - di_minus).abs() / di_sum * 100.0
        } else {
            0.0
        };
    }

    let first_adx = 2 * period - 1;
    for i in first_adx..len {
        out.adx[i] = dx_values[(i + 1 - period)..=i].iter().sum::<f64>() / period as f64;
    }
    out
}

fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Wilder RSI.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

pub struct BollingerOutput {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn calculate_bollinger_bands(prices: &[f64], period: usize, std_dev: f64) -> BollingerOutput {
    let middle = calculate_sma(prices, period);
    let deviation = rolling_std(prices, period, 0);
    let upper = middle
        .iter()
        .zip(&deviation)
        .map(|(mean, sd)| mean + std_dev * sd)
        .collect();
    let lower = middle
        .iter()
        .zip(&deviation)
        .map(|(mean, sd)| mean - std_dev * sd)
        .collect();
    BollingerOutput {
        upper,
        middle,
        lower,
    }
}

/// Average true range as a simple mean of the last `period` true ranges.
pub fn calculate_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let len = closes.len();
    let mut atr_values = vec![f64::NAN; len];
    if period == 0 || len < period + 1 {
        return atr_values;
    }

    let mut tr_values = vec![0.0; len];
    for i in 1..len {
        tr_values[i] = true_range(highs[i], lows[i], closes[i - 1]);
    }
    for i in period..len {
        atr_values[i] = tr_values[(i + 1 - period)..=i].iter().sum::<f64>() / period as f64;
    }
    atr_values
}

pub fn calculate_obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut obv_values = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        if closes[i] > closes[i - 1] {
            obv_values[i] = obv_values[i - 1] + volumes[i];
        } else if closes[i] < closes[i - 1] {
            obv_values[i] = obv_values[i - 1] - volumes[i];
        } else {
            obv_values[i] = obv_values[i - 1];
        }
    }
    obv_values
}

/// Accumulation/distribution line.
pub fn calculate_adl(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut adl_values = vec![0.0; closes.len()];
    let mut running = 0.0;
    for i in 0..closes.len() {
        let range = highs[i] - lows[i];
        let money_flow_multiplier = if range > 0.0 {
            ((closes[i] - lows[i]) - (highs[i] - closes[i])) / range
        } else {
            0.0
        };
        running += money_flow_multiplier * volumes[i];
        adl_values[i] = running;
    }
    adl_values
}

pub fn calculate_mfi(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
    period: usize,
) -> Vec<f64> {
    let len = closes.len();
    let mut mfi_values = vec![f64::NAN; len];
    if period == 0 || len < period + 1 {
        return mfi_values;
    }

    let typical_prices: Vec<f64> = (0..len)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let money_flows: Vec<f64> = (0..len).map(|i| typical_prices[i] * volumes[i]).collect();

    for (i, mfi_value) in mfi_values.iter_mut().enumerate().skip(period) {
        let mut positive_money_flow = 0.0;
        let mut negative_money_flow = 0.0;
        for j in (i + 1 - period)..=i {
            if typical_prices[j] > typical_prices[j - 1] {
                positive_money_flow += money_flows[j];
            } else {
                negative_money_flow += money_flows[j];
            }
        }

        *mfi_value = if negative_money_flow > 0.0 {
            let money_ratio = positive_money_flow / negative_money_flow;
            100.0 - (100.0 / (1.0 + money_ratio))
        } else {
            100.0
        };
    }
    mfi_values
}

/// Williams %R over `period` bars, in `[-100, 0]`.
pub fn calculate_williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let highest = rolling_max(highs, period);
    let lowest = rolling_min(lows, period);
    (0..closes.len())
        .map(|i| {
            let range = highest[i] - lowest[i];
            if range > 0.0 {
                (highest[i] - closes[i]) / range * -100.0
            } else if range == 0.0 {
                -50.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

pub struct StochasticOutput {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    smoothing: usize,
) -> StochasticOutput {
    let highest = rolling_max(highs, period);
    let lowest = rolling_min(lows, period);
    let k: Vec<f64> = (0..closes.len())
        .map(|i| {
            let range = highest[i] - lowest[i];
            if range > 0.0 {
                (closes[i] - lowest[i]) / range * 100.0
            } else if range == 0.0 {
                50.0
            } else {
                f64::NAN
            }
        })
        .collect();
    let d = calculate_sma_skipping_warmup(&k, smoothing);
    StochasticOutput { k, d }
}

/// Commodity channel index with the usual 0.015 constant.
pub fn calculate_cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let typical: Vec<f64> = (0..closes.len())
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let mean = calculate_sma(&typical, period);
    let mut cci_values = vec![f64::NAN; closes.len()];
    if period == 0 {
        return cci_values;
    }
    for i in (period.saturating_sub(1))..typical.len() {
        let window = &typical[(i + 1 - period)..=i];
        let mean_deviation =
            window.iter().map(|value| (value - mean[i]).abs()).sum::<f64>() / period as f64;
        cci_values[i] = if mean_deviation > 0.0 {
            (typical[i] - mean[i]) / (0.015 * mean_deviation)
        } else {
            0.0
        };
    }
    cci_values
}

/// Percent rate of change over `period` bars.
pub fn calculate_roc(prices: &[f64], period: usize) -> Vec<f64> {
    (0..prices.len())
        .map(|i| {
            if i < period || prices[i - period] == 0.0 {
                f64::NAN
            } else {
                (prices[i] / prices[i - period] - 1.0) * 100.0
            }
        })
        .collect()
}

/// Sample standard deviation (`ddof`) over a trailing window.
pub fn rolling_std(values: &[f64], period: usize, ddof: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || period <= ddof || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[(i + 1 - period)..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let sum_sq: f64 = window.iter().map(|value| (value - mean).powi(2)).sum();
        out[i] = (sum_sq / (period - ddof) as f64).sqrt();
    }
    out
}

/// Rolling third and fourth standardized moments (excess kurtosis).
pub fn rolling_moments(values: &[f64], period: usize) -> (Vec<f64>, Vec<f64>) {
    let mut skew = vec![f64::NAN; values.len()];
    let mut kurtosis = vec![f64::NAN; values.len()];
    if period < 4 || values.len() < period {
        return (skew, kurtosis);
    }
    for i in (period - 1)..values.len() {
        let window = &values[(i + 1 - period)..=i];
        if window.iter().any(|value| !value.is_finite()) {
            continue;
        }
        let mean = window.mean();
        let sd = window.population_std_dev();
        if sd.is_nan() || sd <= 0.0 {
            skew[i] = 0.0;
            kurtosis[i] = 0.0;
            continue;
        }
        let n = period as f64;
        let m3 = window.iter().map(|v| ((v - mean) / sd).powi(3)).sum::<f64>() / n;
        let m4 = window.iter().map(|v| ((v - mean) / sd).powi(4)).sum::<f64>() / n;
        skew[i] = m3;
        kurtosis[i] = m4 - 3.0;
    }
    (skew, kurtosis)
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_fold(values, period, f64::NEG_INFINITY, f64::max)
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_fold(values, period, f64::INFINITY, f64::min)
}

fn rolling_fold(values: &[f64], period: usize, init: f64, fold: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        out[i] = values[(i + 1 - period)..=i].iter().copied().fold(init, fold);
    }
    out
}

/// SMA that starts at the first finite value instead of at index 0.
fn calculate_sma_skipping_warmup(values: &[f64], period: usize) -> Vec<f64> {
    let first = values
        .iter()
        .position(|value| value.is_finite())
        .unwrap_or(values.len());
    let mut out = vec![f64::NAN; first];
    out.extend(calculate_sma(&values[first..], period));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_pads_warmup_with_nan() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(sma[0].is_nan() && sma[1].is_nan());
        assert_eq!(sma[2], 2.0);
        assert_eq!(sma[3], 3.0);
    }

    #[test]
    fn series_keep_input_length() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin()).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let volumes = vec![1_000.0; closes.len()];

        assert_eq!(calculate_adx(&highs, &lows, &closes, 14).adx.len(), 40);
        assert_eq!(calculate_atr(&highs, &lows, &closes, 14).len(), 40);
        assert_eq!(calculate_mfi(&highs, &lows, &closes, &volumes, 14).len(), 40);
        assert_eq!(calculate_stochastic(&highs, &lows, &closes, 14, 3).d.len(), 40);
        assert_eq!(calculate_cci(&highs, &lows, &closes, 20).len(), 40);
        assert!(calculate_adx(&highs, &lows, &closes, 14).adx[27].is_finite());
    }

    #[test]
    fn rsi_saturates_on_monotonic_rise() {
        let prices: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi[13].is_nan());
        assert_eq!(rsi[19], 100.0);
    }

    #[test]
    fn rolling_std_matches_sample_formula() {
        let std = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8, 1);
        assert!((std[7] - 2.138089935299395).abs() < 1e-12);
    }
}
