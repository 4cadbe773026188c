use crate::error::ModelError;
use ndarray::{Array1, ArrayView1, Zip};

/// Confusion counts for binary predictions thresholded at 0.5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl Confusion {
    pub fn from_predictions(predicted: ArrayView1<u8>, actual: ArrayView1<u8>) -> Self {
        let mut counts = Confusion::default();
        Zip::from(predicted).and(actual).for_each(|p, a| match (*p == 1, *a == 1) {
            (true, true) => counts.true_positive += 1,
            (true, false) => counts.false_positive += 1,
            (false, false) => counts.true_negative += 1,
            (false, true) => counts.false_negative += 1,
        });
        counts
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// 0 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    }

    /// Area under the ROC curve of hard 0/1 predictions, which reduces to the
    /// mean of sensitivity and specificity. Undefined with a single class.
    pub fn roc_auc(&self) -> Result<f64, ModelError> {
        let positives = self.true_positive + self.false_negative;
        let negatives = self.true_negative + self.false_positive;
        if positives == 0 || negatives == 0 {
            return Err(ModelError::UndefinedMetric(
                "roc_auc needs both classes in the evaluated rows",
            ));
        }
        let sensitivity = self.true_positive as f64 / positives as f64;
        let specificity = self.true_negative as f64 / negatives as f64;
        Ok((sensitivity + specificity) / 2.0)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Scales a `[0, 1]` metric to a rounded percentage.
pub fn to_percent(value: f64) -> u8 {
    (value * 100.0).round_ties_even().clamp(0.0, 100.0) as u8
}

pub fn binarize(probabilities: ArrayView1<f64>) -> Array1<u8> {
    probabilities.mapv(|p| u8::from(p >= 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn counts_and_derived_metrics() {
        let predicted = array![1, 1, 0, 0, 1, 0];
        let actual = array![1, 0, 0, 1, 1, 0];
        let c = Confusion::from_predictions(predicted.view(), actual.view());
        assert_eq!(c.true_positive, 2);
        assert_eq!(c.false_positive, 1);
        assert_eq!(c.true_negative, 2);
        assert_eq!(c.false_negative, 1);
        assert_eq!(to_percent(c.accuracy()), 67);
        assert_eq!(to_percent(c.precision()), 67);
        assert_eq!(to_percent(c.recall()), 67);
        assert_eq!(to_percent(c.f1()), 67);
        assert_eq!(to_percent(c.roc_auc().unwrap()), 67);
    }

    #[test]
    fn no_positive_predictions_gives_zero_precision() {
        let c = Confusion::from_predictions(array![0, 0, 0].view(), array![1, 0, 1].view());
        assert_eq!(c.precision(), 0.0);
        assert_eq!(c.f1(), 0.0);
    }

    #[test]
    fn single_class_roc_is_undefined() {
        let c = Confusion::from_predictions(array![1, 0].view(), array![1, 1].view());
        assert!(matches!(c.roc_auc(), Err(ModelError::UndefinedMetric(_))));
    }

    #[test]
    fn binarize_uses_half_as_positive() {
        assert_eq!(binarize(array![0.49, 0.5, 0.9].view()), array![0, 1, 1]);
    }

    #[test]
    fn percent_rounds_half_to_even() {
        assert_eq!(to_percent(0.125), 12);
        assert_eq!(to_percent(0.135), 14);
        assert_eq!(to_percent(1.0), 100);
    }
}
