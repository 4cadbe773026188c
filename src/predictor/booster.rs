use crate::error::ModelError;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const MIN_HESSIAN: f64 = 1e-16;
const PROBABILITY_CLAMP: f64 = 1e-6;
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostingParams {
    /// Trees appended by every call to `fit`.
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub num_leaves: usize,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub subsample: f64,
    /// Row bagging runs every `subsample_freq` trees; 0 disables it.
    pub subsample_freq: usize,
    pub colsample_bytree: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.005,
            max_depth: 5,
            num_leaves: 31,
            min_child_samples: 5,
            min_child_weight: 1e-3,
            subsample: 0.8,
            subsample_freq: 0,
            colsample_bytree: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 0.1,
            seed: 42,
        }
    }
}

/// One regression tree. Internal node `i` sends a row left when
/// `row[split_features[i]] <= thresholds[i]`; negative child indices point at
/// leaf `-child - 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
    shrinkage: f64,
}

impl RegressionTree {
    pub fn num_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    pub fn predict(&self, features: ArrayView1<f64>) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default() * self.shrinkage;
        }
        let mut node_idx = 0usize;
        loop {
            let feature_value = features
                .get(self.split_features[node_idx])
                .copied()
                .unwrap_or(0.0);
            let child = if feature_value <= self.thresholds[node_idx] {
                self.left_child[node_idx]
            } else {
                self.right_child[node_idx]
            };

            if child < 0 {
                let leaf_idx = (-child - 1) as usize;
                return self.leaf_values.get(leaf_idx).copied().unwrap_or_default()
                    * self.shrinkage;
            }
            node_idx = child as usize;
        }
    }
}

/// Binary gradient-boosted tree classifier with logistic loss. Every `fit`
/// continues boosting from the trees already present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostedClassifier {
    params: BoostingParams,
    trees: Vec<RegressionTree>,
    init_score: f64,
    feature_count: usize,
}

impl GradientBoostedClassifier {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            init_score: 0.0,
            feature_count: 0,
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn set_params(&mut self, params: BoostingParams) {
        self.params = params;
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, labels: ArrayView1<u8>) -> Result<(), ModelError> {
        let (n, width) = x.dim();
        if n == 0 || n != labels.len() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if self.is_fitted() {
            if width != self.feature_count {
                return Err(ModelError::DimensionMismatch {
                    expected: self.feature_count,
                    got: width,
                });
            }
        } else {
            self.feature_count = width;
            let positives = labels.iter().filter(|label| **label == 1).count();
            let rate = (positives as f64 / labels.len() as f64)
                .clamp(PROBABILITY_CLAMP, 1.0 - PROBABILITY_CLAMP);
            self.init_score = (rate / (1.0 - rate)).ln();
        }

        let targets = labels.mapv(f64::from);
        let mut raw = Zip::from(x.rows()).par_map_collect(|row| self.predict_raw(row));

        for _ in 0..self.params.n_estimators {
            let probabilities = raw.mapv(sigmoid);
            let gradients = &probabilities - &targets;
            let hessians = probabilities.mapv(|p| (p * (1.0 - p)).max(MIN_HESSIAN));

            let iteration = self.trees.len() as u64;
            let mut rng = StdRng::seed_from_u64(
                self.params.seed ^ iteration.wrapping_add(1).wrapping_mul(SEED_STRIDE),
            );
            let sampled_rows = self.sample_rows(n, iteration, &mut rng);
            let sampled_features = sample_fraction(width, self.params.colsample_bytree, &mut rng);

            let tree = TreeBuilder {
                x: x.view(),
                gradients: gradients.view(),
                hessians: hessians.view(),
                features: &sampled_features,
                params: &self.params,
            }
            .build(sampled_rows);

            Zip::from(&mut raw)
                .and(x.rows())
                .par_for_each(|score, row| *score += tree.predict(row));
            self.trees.push(tree);
        }
        Ok(())
    }

    fn sample_rows(&self, n: usize, iteration: u64, rng: &mut StdRng) -> Vec<usize> {
        let freq = self.params.subsample_freq as u64;
        if freq > 0 && self.params.subsample < 1.0 && iteration % freq == 0 {
            sample_fraction(n, self.params.subsample, rng)
        } else {
            (0..n).collect()
        }
    }

    pub fn predict_raw(&self, row: ArrayView1<f64>) -> f64 {
        self.init_score + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }

    /// Class-1 probability per row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        if x.ncols() != self.feature_count {
            return Err(ModelError::DimensionMismatch {
                expected: self.feature_count,
                got: x.ncols(),
            });
        }
        Ok(Zip::from(x.rows()).par_map_collect(|row| sigmoid(self.predict_raw(row))))
    }
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Sorted random subset holding `fraction` of `0..n` (at least one index).
fn sample_fraction(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if fraction >= 1.0 || n == 0 {
        return indices;
    }
    let take = ((n as f64 * fraction).round() as usize).clamp(1, n);
    indices.shuffle(rng);
    indices.truncate(take);
    indices.sort_unstable();
    indices
}

fn soft_threshold(gradient_sum: f64, alpha: f64) -> f64 {
    gradient_sum.signum() * (gradient_sum.abs() - alpha).max(0.0)
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Leaf {
    rows: Vec<usize>,
    depth: usize,
    gradient_sum: f64,
    hessian_sum: f64,
    parent: Option<(usize, bool)>,
    best: Option<SplitCandidate>,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    gradients: ArrayView1<'a, f64>,
    hessians: ArrayView1<'a, f64>,
    features: &'a [usize],
    params: &'a BoostingParams,
}

impl TreeBuilder<'_> {
    fn leaf_score(&self, gradient_sum: f64, hessian_sum: f64) -> f64 {
        let g = soft_threshold(gradient_sum, self.params.reg_alpha);
        g * g / (hessian_sum + self.params.reg_lambda)
    }

    fn leaf_value(&self, gradient_sum: f64, hessian_sum: f64) -> f64 {
        -soft_threshold(gradient_sum, self.params.reg_alpha)
            / (hessian_sum + self.params.reg_lambda)
    }

    fn make_leaf(&self, rows: Vec<usize>, depth: usize, parent: Option<(usize, bool)>) -> Leaf {
        let gradient_sum = rows.iter().map(|idx| self.gradients[*idx]).sum();
        let hessian_sum = rows.iter().map(|idx| self.hessians[*idx]).sum();
        let mut leaf = Leaf {
            rows,
            depth,
            gradient_sum,
            hessian_sum,
            parent,
            best: None,
        };
        if depth < self.params.max_depth {
            leaf.best = self.best_split(&leaf);
        }
        leaf
    }

    fn best_split(&self, leaf: &Leaf) -> Option<SplitCandidate> {
        let min_samples = self.params.min_child_samples.max(1);
        if leaf.rows.len() < 2 * min_samples {
            return None;
        }
        let parent_score = self.leaf_score(leaf.gradient_sum, leaf.hessian_sum);

        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&feature| {
                let mut ordered: Vec<(f64, usize)> = leaf
                    .rows
                    .iter()
                    .map(|idx| (self.x[[*idx, feature]], *idx))
                    .collect();
                ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

                let mut best: Option<SplitCandidate> = None;
                let (mut left_g, mut left_h) = (0.0, 0.0);
                for pos in 0..ordered.len() - 1 {
                    let (value, idx) = ordered[pos];
                    left_g += self.gradients[idx];
                    left_h += self.hessians[idx];
                    let next_value = ordered[pos + 1].0;
                    if next_value <= value {
                        continue;
                    }
                    let left_count = pos + 1;
                    let right_count = ordered.len() - left_count;
                    if left_count < min_samples || right_count < min_samples {
                        continue;
                    }
                    let right_g = leaf.gradient_sum - left_g;
                    let right_h = leaf.hessian_sum - left_h;
                    if left_h < self.params.min_child_weight
                        || right_h < self.params.min_child_weight
                    {
                        continue;
                    }
                    let gain = self.leaf_score(left_g, left_h) + self.leaf_score(right_g, right_h)
                        - parent_score;
                    if gain > best.map_or(1e-12, |candidate| candidate.gain) {
                        let mut threshold = value + (next_value - value) / 2.0;
                        if threshold >= next_value {
                            threshold = value;
                        }
                        best = Some(SplitCandidate {
                            feature,
                            threshold,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        candidates.into_iter().flatten().fold(None, |best, candidate| match best {
            Some(current) if current.gain >= candidate.gain => Some(current),
            _ => Some(candidate),
        })
    }

    /// Leaf-wise growth: always split the leaf with the largest gain.
    fn build(&self, rows: Vec<usize>) -> RegressionTree {
        let mut split_features = Vec::new();
        let mut thresholds = Vec::new();
        let mut left_child: Vec<i32> = Vec::new();
        let mut right_child: Vec<i32> = Vec::new();
        let mut leaves = vec![self.make_leaf(rows, 0, None)];

        while leaves.len() < self.params.num_leaves.max(1) {
            let next = leaves
                .iter()
                .enumerate()
                .filter_map(|(idx, leaf)| leaf.best.map(|split| (idx, split.gain)))
                .fold(None, |best: Option<(usize, f64)>, (idx, gain)| match best {
                    Some((_, best_gain)) if best_gain >= gain => best,
                    _ => Some((idx, gain)),
                });
            let Some((leaf_idx, _)) = next else {
                break;
            };

            let leaf = leaves.swap_remove(leaf_idx);
            let Some(split) = leaf.best else {
                break;
            };
            let node = split_features.len();
            split_features.push(split.feature);
            thresholds.push(split.threshold);
            left_child.push(0);
            right_child.push(0);
            if let Some((parent, is_left)) = leaf.parent {
                if is_left {
                    left_child[parent] = node as i32;
                } else {
                    right_child[parent] = node as i32;
                }
            }

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .into_iter()
                .partition(|idx| self.x[[*idx, split.feature]] <= split.threshold);
            leaves.push(self.make_leaf(left_rows, leaf.depth + 1, Some((node, true))));
            leaves.push(self.make_leaf(right_rows, leaf.depth + 1, Some((node, false))));
        }

        let mut leaf_values = Vec::with_capacity(leaves.len());
        for (leaf_idx, leaf) in leaves.iter().enumerate() {
            let pointer = -(leaf_idx as i32) - 1;
            if let Some((parent, is_left)) = leaf.parent {
                if is_left {
                    left_child[parent] = pointer;
                } else {
                    right_child[parent] = pointer;
                }
            }
            leaf_values.push(self.leaf_value(leaf.gradient_sum, leaf.hessian_sum));
        }

        RegressionTree {
            split_features,
            thresholds,
            left_child,
            right_child,
            leaf_values,
            shrinkage: self.params.learning_rate,
        }
    }
}
