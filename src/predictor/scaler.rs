use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column min-max scaling onto `[0, 1]`. Constant columns map to 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MinMaxScaler {
    mins: Array1<f64>,
    ranges: Array1<f64>,
}

impl MinMaxScaler {
    pub fn is_fitted(&self) -> bool {
        !self.mins.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.mins.len()
    }

    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let mins = x.fold_axis(Axis(0), f64::INFINITY, |acc, value| acc.min(*value));
        let maxs = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, value| acc.max(*value));
        self.ranges = &maxs - &mins;
        self.mins = mins;
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        if x.ncols() != self.mins.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.mins.len(),
                got: x.ncols(),
            });
        }
        let mut scaled = &x - &self.mins;
        for (mut column, range) in scaled.axis_iter_mut(Axis(1)).zip(self.ranges.iter()) {
            if *range > 0.0 {
                column.mapv_inplace(|value| value / range);
            } else {
                column.fill(0.0);
            }
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scales_fit_data_into_unit_range() {
        let x = array![[1.0, 5.0], [3.0, 5.0], [2.0, 5.0]];
        let mut scaler = MinMaxScaler::default();
        scaler.fit(x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();
        assert_eq!(scaled, array![[0.0, 0.0], [1.0, 0.0], [0.5, 0.0]]);
    }

    #[test]
    fn unseen_values_extrapolate_linearly() {
        let mut scaler = MinMaxScaler::default();
        scaler.fit(array![[0.0], [10.0]].view()).unwrap();
        assert_eq!(scaler.transform(array![[20.0]].view()).unwrap(), array![[2.0]]);
    }

    #[test]
    fn rejects_unfitted_and_wrong_width() {
        let scaler = MinMaxScaler::default();
        assert!(matches!(
            scaler.transform(array![[1.0]].view()),
            Err(ModelError::NotFitted)
        ));
        let mut scaler = MinMaxScaler::default();
        scaler.fit(array![[1.0, 2.0]].view()).unwrap();
        assert!(matches!(
            scaler.transform(array![[1.0]].view()),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
