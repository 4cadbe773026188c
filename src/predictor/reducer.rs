use crate::error::ModelError;
use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewMut1, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_VARIANCE_RATIO: f64 = 0.95;
pub const DEFAULT_MAX_COMPONENTS: usize = 64;
const POWER_ITERATIONS: usize = 12;
const EIGEN_MAX_ITERATIONS: usize = 1_000;
const EIGEN_TOLERANCE: f64 = 1e-12;
const INIT_SEED: u64 = 42;

/// Principal component projection keeping the smallest number of components
/// whose cumulative explained variance reaches `variance_ratio`.
///
/// Components come from a block power iteration on the covariance operator
/// (never materialized) followed by a Rayleigh-Ritz step, so at most
/// `max_components` directions are ever considered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PcaReducer {
    variance_ratio: f64,
    max_components: usize,
    mean: Array1<f64>,
    /// One component per row.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    total_variance: f64,
}

impl Default for PcaReducer {
    fn default() -> Self {
        Self::new(DEFAULT_VARIANCE_RATIO, DEFAULT_MAX_COMPONENTS)
    }
}

impl PcaReducer {
    pub fn new(variance_ratio: f64, max_components: usize) -> Self {
        Self {
            variance_ratio,
            max_components: max_components.max(1),
            mean: Array1::zeros(0),
            components: Array2::zeros((0, 0)),
            explained_variance: Array1::zeros(0),
            total_variance: 0.0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.components.nrows() > 0
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        if self.total_variance <= 0.0 {
            return Array1::zeros(self.explained_variance.len());
        }
        &self.explained_variance / self.total_variance
    }

    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<(), ModelError> {
        let (n, d) = x.dim();
        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let centered = &x - &mean;
        let denom = (n.max(2) - 1) as f64;
        let total_variance = centered.iter().map(|value| value * value).sum::<f64>() / denom;

        self.mean = mean;
        self.total_variance = total_variance;
        if d == 0 {
            self.components = Array2::zeros((0, 0));
            self.explained_variance = Array1::zeros(0);
            return Ok(());
        }

        let k = self.max_components.min(d).min(n).max(1);
        let mut rng = StdRng::seed_from_u64(INIT_SEED);
        let mut basis: Array2<f64> = Array2::from_shape_fn((d, k), |_| rng.gen_range(-0.5..0.5));
        orthonormalize_columns(&mut basis);
        for _ in 0..POWER_ITERATIONS {
            basis = centered.t().dot(&centered.dot(&basis));
            orthonormalize_columns(&mut basis);
        }

        // Rayleigh-Ritz: rotate the basis onto the eigenvectors of the
        // covariance restricted to it.
        let projected = centered.dot(&basis);
        let small = projected.t().dot(&projected) / denom;
        let eigen = EigenDecomposition::from_symmetric(&small, &mut rng);

        let mut components = basis.dot(&eigen.eigenvectors).reversed_axes();
        for component in components.rows_mut() {
            flip_sign(component);
        }
        let explained = eigen.eigenvalues.mapv(|value| value.max(0.0));

        let keep = if total_variance > 0.0 {
            let mut cumulative = 0.0;
            let mut keep = explained.len();
            for (idx, value) in explained.iter().enumerate() {
                cumulative += value / total_variance;
                if cumulative >= self.variance_ratio - 1e-12 {
                    keep = idx + 1;
                    break;
                }
            }
            keep
        } else {
            1
        };
        self.components = components.slice(s![..keep, ..]).to_owned();
        self.explained_variance = explained.slice(s![..keep]).to_owned();
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        if x.ncols() != self.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.mean.len(),
                got: x.ncols(),
            });
        }
        Ok((&x - &self.mean).dot(&self.components.t()))
    }
}

/// Modified Gram-Schmidt over columns. Degenerate directions collapse to
/// zero vectors.
fn orthonormalize_columns(basis: &mut Array2<f64>) {
    for j in 0..basis.ncols() {
        let (done, mut rest) = basis.view_mut().split_at(Axis(1), j);
        let mut current = rest.column_mut(0);
        for previous in done.columns() {
            let projection = current.dot(&previous);
            current.scaled_add(-projection, &previous);
        }
        let norm = current.dot(&current).sqrt();
        if norm > 1e-12 {
            current /= norm;
        } else {
            current.fill(0.0);
        }
    }
}

/// Largest-magnitude loading is made positive.
fn flip_sign(mut component: ArrayViewMut1<f64>) {
    let pivot = component
        .iter()
        .copied()
        .fold(0.0f64, |best, value| if value.abs() > best.abs() { value } else { best });
    if pivot < 0.0 {
        component.mapv_inplace(|value| -value);
    }
}

/// Eigen decomposition of a small symmetric positive semi-definite matrix.
struct EigenDecomposition {
    /// Descending.
    eigenvalues: Array1<f64>,
    /// Column `i` belongs to `eigenvalues[i]`.
    eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Power iteration with deflation. Each new vector is also kept
    /// orthogonal to the ones already found.
    fn from_symmetric(matrix: &Array2<f64>, rng: &mut StdRng) -> Self {
        let n = matrix.nrows();
        let mut eigenvalues: Array1<f64> = Array1::zeros(n);
        let mut eigenvectors: Array2<f64> = Array2::zeros((n, n));
        let mut deflated = matrix.clone();

        for i in 0..n {
            let start: Array1<f64> = Array1::from_shape_fn(n, |_| rng.gen_range(-0.5..0.5));
            let (value, vector) =
                power_iteration(&deflated, start, eigenvectors.slice(s![.., ..i]));
            let column = vector.view().insert_axis(Axis(1));
            deflated = deflated - value * column.dot(&column.t());
            eigenvalues[i] = value;
            eigenvectors.column_mut(i).assign(&vector);
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|a, b| {
            eigenvalues[*b]
                .partial_cmp(&eigenvalues[*a])
                .unwrap_or(Ordering::Equal)
        });
        Self {
            eigenvalues: eigenvalues.select(Axis(0), &order),
            eigenvectors: eigenvectors.select(Axis(1), &order),
        }
    }
}

fn project_out(vector: &mut Array1<f64>, found: ArrayView2<f64>) {
    for previous in found.columns() {
        let projection = previous.dot(&*vector);
        vector.scaled_add(-projection, &previous);
    }
}

fn power_iteration(
    matrix: &Array2<f64>,
    mut vector: Array1<f64>,
    found: ArrayView2<f64>,
) -> (f64, Array1<f64>) {
    project_out(&mut vector, found);
    let norm = vector.dot(&vector).sqrt();
    if norm > 1e-12 {
        vector /= norm;
    }

    let mut eigenvalue = 0.0;
    for _ in 0..EIGEN_MAX_ITERATIONS {
        let mut next = matrix.dot(&vector);
        let rayleigh = vector.dot(&next);
        project_out(&mut next, found);
        let norm = next.dot(&next).sqrt();
        if norm <= 1e-12 {
            return (rayleigh, vector);
        }
        next /= norm;
        let converged = (rayleigh - eigenvalue).abs() <= EIGEN_TOLERANCE * rayleigh.abs().max(1.0);
        eigenvalue = rayleigh;
        vector = next;
        if converged {
            break;
        }
    }
    (eigenvalue, vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn correlated_rows() -> Array2<f64> {
        Array2::from_shape_fn((50, 3), |(i, j)| {
            let x = i as f64;
            let wobble = if i % 2 == 0 { 0.01 } else { -0.01 };
            match j {
                0 => x,
                1 => 2.0 * x + wobble,
                _ => 5.0 + wobble,
            }
        })
    }

    #[test]
    fn dominant_direction_is_kept_alone() {
        let x = correlated_rows();
        let mut pca = PcaReducer::default();
        pca.fit(x.view()).unwrap();
        assert_eq!(pca.n_components(), 1);
        let component = pca.components().row(0);
        assert!((component[1] / component[0] - 2.0).abs() < 1e-3);
        assert!(component[1] > 0.0);
        assert!(pca.explained_variance_ratio()[0] > 0.99);
    }

    #[test]
    fn planar_data_keeps_two_components() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| {
            let a = (i as f64 * 0.7).sin() * 3.0;
            let b = (i as f64 * 1.3).cos() * 2.0;
            [a, b, a + b][j]
        });
        let mut pca = PcaReducer::default();
        pca.fit(x.view()).unwrap();
        assert_eq!(pca.n_components(), 2);
        assert!(pca.explained_variance_ratio().sum() > 0.999);
    }

    #[test]
    fn transform_projects_centered_rows() {
        let x = correlated_rows();
        let mut pca = PcaReducer::default();
        pca.fit(x.view()).unwrap();
        let projected = pca.transform(x.view()).unwrap();
        assert_eq!(projected.ncols(), 1);
        assert!(projected.column(0).mean().unwrap().abs() < 1e-9);
        assert!(projected[[49, 0]] > projected[[0, 0]]);
    }

    #[test]
    fn eigen_decomposition_of_symmetric_matrix() {
        let mut rng = StdRng::seed_from_u64(7);
        let eigen = EigenDecomposition::from_symmetric(&array![[2.0, 1.0], [1.0, 2.0]], &mut rng);
        assert!((eigen.eigenvalues[0] - 3.0).abs() < 1e-9);
        assert!((eigen.eigenvalues[1] - 1.0).abs() < 1e-9);
        for column in eigen.eigenvectors.columns() {
            assert!((column.dot(&column).sqrt() - 1.0).abs() < 1e-9);
        }
        let cross = eigen.eigenvectors.column(0).dot(&eigen.eigenvectors.column(1));
        assert!(cross.abs() < 1e-9);
    }
}
