use crate::models::LabeledFrame;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SHUFFLE_SEED: u64 = 42;

#[derive(Debug, Clone, Default)]
pub struct Split {
    /// Labeled rows from the head of the series, shuffled.
    pub train: LabeledFrame,
    /// Tail of the series in date order, live row included.
    pub test: LabeledFrame,
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetSplitter {
    test_fraction: f64,
    seed: u64,
}

impl Default for DatasetSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_TEST_FRACTION, DEFAULT_SHUFFLE_SEED)
    }
}

impl DatasetSplitter {
    pub fn new(test_fraction: f64, seed: u64) -> Self {
        Self {
            test_fraction: test_fraction.clamp(0.0, 1.0),
            seed,
        }
    }

    pub fn split_index(&self, len: usize) -> usize {
        ((len as f64) * (1.0 - self.test_fraction)).floor() as usize
    }

    /// Temporal split of a date-ordered frame. The live row can only ever
    /// land in the test partition; it is dropped from train if the split
    /// point leaves it there.
    pub fn split(&self, frame: &LabeledFrame) -> Split {
        let cut = self.split_index(frame.len());
        let train = frame.slice(0, cut).labeled();
        Split {
            train: self.shuffle(&train),
            test: frame.slice(cut, frame.len()),
        }
    }

    /// Row permutation with the fixed seed.
    pub fn shuffle(&self, frame: &LabeledFrame) -> LabeledFrame {
        let mut order: Vec<usize> = (0..frame.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let mut out = LabeledFrame::with_columns(frame.feature_names.clone());
        for idx in order {
            out.push_row(
                frame.dates[idx],
                frame.features[idx].clone(),
                frame.targets[idx],
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn frame(len: usize) -> LabeledFrame {
        let start = NaiveDate::from_ymd_opt(2005, 3, 31).unwrap();
        let mut frame = LabeledFrame::with_columns(vec!["x".into()]);
        for i in 0..len {
            let target = if i + 1 == len { None } else { Some((i % 2) as u8) };
            frame.push_row(start + Duration::days(91 * i as i64), vec![i as f64], target);
        }
        frame
    }

    #[test]
    fn test_rows_never_precede_train_rows() {
        let data = frame(61);
        let split = DatasetSplitter::default().split(&data);
        assert_eq!(split.train.len(), 48);
        assert_eq!(split.test.len(), 13);
        let max_train = split.train.dates.iter().max().unwrap();
        assert!(split.test.dates.iter().all(|date| date >= max_train));
        assert_eq!(split.test.targets.last(), Some(&None));
        assert!(split.train.targets.iter().all(Option::is_some));
    }

    #[test]
    fn train_shuffle_is_a_deterministic_permutation() {
        let data = frame(80);
        let splitter = DatasetSplitter::default();
        let first = splitter.split(&data);
        let second = splitter.split(&data);
        assert_eq!(first.train, second.train);

        let mut values: Vec<f64> = first.train.features.iter().map(|row| row[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = (0..64).map(|i| i as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn live_row_is_dropped_from_train_when_test_is_empty() {
        let data = frame(10);
        let split = DatasetSplitter::new(0.0, 42).split(&data);
        assert_eq!(split.train.len(), 9);
        assert!(split.test.is_empty());
    }
}
