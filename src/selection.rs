use crate::models::LabeledFrame;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::cmp::Ordering;

pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.75;
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScore {
    pub name: String,
    pub score: f64,
    pub p_value: Option<f64>,
}

/// Pearson correlation. Zero-variance inputs give 0.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let corr = cov / (var_x * var_y).sqrt();
    if corr.is_finite() {
        corr
    } else {
        0.0
    }
}

fn labeled_columns(frame: &LabeledFrame) -> (Vec<Vec<f64>>, Vec<f64>) {
    let labeled = frame.labeled();
    let columns = (0..labeled.feature_names.len())
        .map(|idx| labeled.column(idx))
        .collect();
    let targets = labeled
        .targets
        .iter()
        .map(|target| f64::from(target.unwrap_or_default()))
        .collect();
    (columns, targets)
}

/// Ranks features by absolute correlation with the target and keeps a
/// feature only if its absolute correlation with every feature already kept
/// is at most `threshold`. Stops after `top_n` features.
pub fn select_by_correlation(frame: &LabeledFrame, threshold: f64, top_n: usize) -> Vec<FeatureScore> {
    let (columns, targets) = labeled_columns(frame);
    let target_corr: Vec<f64> = columns
        .par_iter()
        .map(|column| pearson(column, &targets).abs())
        .collect();

    let mut ranked: Vec<usize> = (0..columns.len()).collect();
    ranked.sort_by(|a, b| {
        target_corr[*b]
            .partial_cmp(&target_corr[*a])
            .unwrap_or(Ordering::Equal)
    });

    let mut accepted: Vec<usize> = Vec::new();
    for candidate in ranked {
        if accepted.len() >= top_n {
            break;
        }
        let redundant = accepted
            .iter()
            .any(|kept| pearson(&columns[candidate], &columns[*kept]).abs() > threshold);
        if !redundant {
            accepted.push(candidate);
        }
    }

    accepted
        .into_iter()
        .map(|idx| FeatureScore {
            name: frame.feature_names[idx].clone(),
            score: target_corr[idx],
            p_value: None,
        })
        .collect()
}

/// One-way ANOVA F statistic of a feature split by binary target, with the
/// p-value from F(1, n - 2).
pub fn anova_f(column: &[f64], targets: &[f64]) -> (f64, Option<f64>) {
    let n = column.len();
    let (mut sum0, mut sum1, mut n0, mut n1) = (0.0, 0.0, 0usize, 0usize);
    for (value, target) in column.iter().zip(targets) {
        if *target > 0.5 {
            sum1 += value;
            n1 += 1;
        } else {
            sum0 += value;
            n0 += 1;
        }
    }
    if n0 == 0 || n1 == 0 || n < 3 {
        return (0.0, None);
    }
    let mean0 = sum0 / n0 as f64;
    let mean1 = sum1 / n1 as f64;
    let grand = (sum0 + sum1) / n as f64;
    let between = n0 as f64 * (mean0 - grand).powi(2) + n1 as f64 * (mean1 - grand).powi(2);
    let within: f64 = column
        .iter()
        .zip(targets)
        .map(|(value, target)| {
            let mean = if *target > 0.5 { mean1 } else { mean0 };
            (value - mean).powi(2)
        })
        .sum();
    let dof = (n - 2) as f64;
    if within <= 0.0 {
        return if between > 0.0 {
            (f64::INFINITY, Some(0.0))
        } else {
            (0.0, None)
        };
    }
    let f = between / (within / dof);
    let p_value = FisherSnedecor::new(1.0, dof)
        .ok()
        .map(|dist| 1.0 - dist.cdf(f));
    (f, p_value)
}

/// Top `k` features by ANOVA F score, highest first.
pub fn select_univariate(frame: &LabeledFrame, k: usize) -> Vec<FeatureScore> {
    let (columns, targets) = labeled_columns(frame);
    let mut scores: Vec<FeatureScore> = columns
        .par_iter()
        .enumerate()
        .map(|(idx, column)| {
            let (score, p_value) = anova_f(column, &targets);
            FeatureScore {
                name: frame.feature_names[idx].clone(),
                score,
                p_value,
            }
        })
        .collect();
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scores.truncate(k);
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame() -> LabeledFrame {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut frame = LabeledFrame::with_columns(vec![
            "signal".into(),
            "signal_copy".into(),
            "noise".into(),
            "weak".into(),
        ]);
        let noise = [0.3, -1.2, 0.8, 0.1, -0.4, 1.5, -0.9, 0.2, 0.7, -0.6];
        for i in 0..10 {
            let target = (i % 2) as u8;
            let signal = target as f64 * 2.0 + i as f64 * 0.01;
            let weak = target as f64 * 0.3 + noise[i];
            frame.push_row(date, vec![signal, signal * 2.0, noise[i], weak], Some(target));
        }
        frame.push_row(date, vec![100.0, 100.0, 100.0, 100.0], None);
        frame
    }

    #[test]
    fn correlation_selection_drops_redundant_features() {
        let data = frame();
        let selected = select_by_correlation(&data, 0.75, 10);
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names[0], "signal");
        assert!(!names.contains(&"signal_copy"));

        let labeled = data.labeled();
        for (i, a) in selected.iter().enumerate() {
            for b in &selected[i + 1..] {
                let ia = labeled.feature_names.iter().position(|n| *n == a.name).unwrap();
                let ib = labeled.feature_names.iter().position(|n| *n == b.name).unwrap();
                assert!(pearson(&labeled.column(ia), &labeled.column(ib)).abs() <= 0.75);
            }
        }
    }

    #[test]
    fn correlation_selection_respects_top_n() {
        assert_eq!(select_by_correlation(&frame(), 0.99, 1).len(), 1);
    }

    #[test]
    fn ties_keep_column_order() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut data = LabeledFrame::with_columns(vec!["b".into(), "a".into()]);
        for i in 0..6 {
            let target = (i % 2) as u8;
            data.push_row(date, vec![target as f64, target as f64], Some(target));
        }
        let selected = select_by_correlation(&data, 1.0, 10);
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn univariate_ranks_separating_feature_first() {
        let selected = select_univariate(&frame(), 2);
        assert_eq!(selected.len(), 2);
        assert!(selected[0].name.starts_with("signal"));
        let p = selected[0].p_value.unwrap();
        assert!(p < 0.01);
    }

    #[test]
    fn constant_columns_have_zero_correlation() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[0.0, 1.0, 0.0]), 0.0);
    }
}
