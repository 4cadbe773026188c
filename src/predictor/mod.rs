//! Preprocessing, warm-start training, per-ticker fine-tuning and evaluation
//! of the boosted classifier.

pub mod artifact;
pub mod booster;
pub mod metrics;
pub mod reducer;
pub mod scaler;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::models::{EvaluationMetrics, LabeledFrame};
use crate::score::ScoreMapper;
use artifact::{ArtifactStore, ModelArtifact};
use booster::GradientBoostedClassifier;
use log::{debug, info, warn};
use metrics::{binarize, to_percent, Confusion};
use ndarray::{Array1, Array2, ArrayView2};
use reducer::PcaReducer;
use scaler::MinMaxScaler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorState {
    Uninitialized,
    WarmStarted,
    FineTuned,
    Evaluated,
}

pub struct ScorePredictor {
    config: ModelConfig,
    state: PredictorState,
    feature_names: Vec<String>,
    scaler: MinMaxScaler,
    reducer: PcaReducer,
    classifier: GradientBoostedClassifier,
}

fn artifact_error(err: anyhow::Error) -> ModelError {
    ModelError::Artifact(format!("{:#}", err))
}

fn describe_mismatch(expected: &[String], got: &[String]) -> String {
    match expected.iter().zip(got).position(|(a, b)| a != b) {
        Some(idx) => format!(
            "column {} is '{}', expected '{}'",
            idx, got[idx], expected[idx]
        ),
        None => format!("{} columns, expected {}", got.len(), expected.len()),
    }
}

/// ±inf and NaN become 0 before scaling.
fn clean(x: ArrayView2<f64>) -> Array2<f64> {
    x.mapv(|value| if value.is_finite() { value } else { 0.0 })
}

impl ScorePredictor {
    pub fn new(config: ModelConfig) -> Self {
        let classifier = GradientBoostedClassifier::new(config.boosting.clone());
        let reducer = PcaReducer::new(config.variance_ratio, config.max_components);
        Self {
            config,
            state: PredictorState::Uninitialized,
            feature_names: Vec::new(),
            scaler: MinMaxScaler::default(),
            reducer,
            classifier,
        }
    }

    pub fn state(&self) -> PredictorState {
        self.state
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn classifier(&self) -> &GradientBoostedClassifier {
        &self.classifier
    }

    pub fn reducer(&self) -> &PcaReducer {
        &self.reducer
    }

    /// Cleans, scales and projects `x`. With `fit` the scaler and reducer
    /// are refit on `x` first; otherwise the fitted state is reused.
    pub fn preprocess(&mut self, x: ArrayView2<f64>, fit: bool) -> Result<Array2<f64>, ModelError> {
        let cleaned = clean(x);
        if fit {
            let mut scaler = MinMaxScaler::default();
            scaler.fit(cleaned.view())?;
            let mut reducer = PcaReducer::new(self.config.variance_ratio, self.config.max_components);
            reducer.fit(scaler.transform(cleaned.view())?.view())?;
            debug!(
                "Preprocessing fit: {} columns reduced to {} components",
                scaler.n_features(),
                reducer.n_components()
            );
            self.scaler = scaler;
            self.reducer = reducer;
        }
        self.transform(x)
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        self.reducer
            .transform(self.scaler.transform(clean(x).view())?.view())
    }

    fn check_columns(&self, frame: &LabeledFrame) -> Result<(), ModelError> {
        if frame.feature_names != self.feature_names {
            return Err(ModelError::FeatureMismatch(describe_mismatch(
                &self.feature_names,
                &frame.feature_names,
            )));
        }
        Ok(())
    }

    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact::new(
            self.feature_names.clone(),
            self.scaler.clone(),
            self.reducer.clone(),
            self.classifier.clone(),
        )
    }

    /// Continues boosting from the stored artifact, through its own scaler
    /// and reducer, when it was trained on the same columns. Otherwise fits
    /// fresh preprocessing and a fresh classifier. Overwrites the artifact.
    pub fn warm_start_training(
        &mut self,
        store: &mut ArtifactStore,
        frame: &LabeledFrame,
    ) -> Result<(), ModelError> {
        let train = frame.labeled();
        if train.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let matrix = train.to_matrix()?;
        let previous = store.load().map_err(artifact_error)?;
        self.feature_names = train.feature_names.clone();

        let x = match previous {
            Some(artifact)
                if artifact.feature_names == self.feature_names
                    && artifact.classifier.feature_count() == artifact.reducer.n_components() =>
            {
                info!(
                    "Continuing warm start from {} existing trees",
                    artifact.classifier.num_trees()
                );
                self.scaler = artifact.scaler;
                self.reducer = artifact.reducer;
                self.classifier = artifact.classifier;
                self.classifier.set_params(self.config.boosting.clone());
                self.preprocess(matrix.view(), false)?
            }
            previous => {
                if let Some(artifact) = previous {
                    warn!(
                        "Stored model was trained on {} columns, this batch has {}. Starting a fresh model",
                        artifact.feature_names.len(),
                        self.feature_names.len()
                    );
                }
                self.classifier = GradientBoostedClassifier::new(self.config.boosting.clone());
                self.preprocess(matrix.view(), true)?
            }
        };

        self.classifier.fit(x.view(), train.label_array().view())?;
        store.save(&self.to_artifact()).map_err(artifact_error)?;
        info!(
            "Warm start trained on {} rows ({} trees), saved to {}",
            train.len(),
            self.classifier.num_trees(),
            store.path().display()
        );
        self.state = PredictorState::WarmStarted;
        Ok(())
    }

    /// Loads the stored artifact and continues boosting on this ticker's
    /// labeled rows. The result stays in memory.
    pub fn fine_tune_model(&mut self, store: &ArtifactStore, frame: &LabeledFrame) -> Result<(), ModelError> {
        let artifact = store
            .load()
            .map_err(artifact_error)?
            .ok_or_else(|| ModelError::MissingArtifact(store.path().display().to_string()))?;

        self.feature_names = artifact.feature_names;
        self.check_columns(frame)?;
        let train = frame.labeled();
        if train.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        self.scaler = artifact.scaler;
        self.reducer = artifact.reducer;
        self.classifier = artifact.classifier;
        self.classifier.set_params(self.config.boosting.clone());

        let x = self.preprocess(train.to_matrix()?.view(), false)?;
        self.classifier.fit(x.view(), train.label_array().view())?;
        self.state = PredictorState::FineTuned;
        Ok(())
    }

    /// Class-1 probability for every row of `frame`.
    pub fn predict_proba(&self, frame: &LabeledFrame) -> Result<Array1<f64>, ModelError> {
        if self.state == PredictorState::Uninitialized {
            return Err(ModelError::NotFitted);
        }
        self.check_columns(frame)?;
        let x = self.transform(frame.to_matrix()?.view())?;
        self.classifier.predict_proba(x.view())
    }

    /// Percentage metrics over the labeled rows of `frame`. The score comes
    /// from the live row when `frame` ends with one.
    pub fn evaluate_model(&mut self, frame: &LabeledFrame) -> Result<EvaluationMetrics, ModelError> {
        let probabilities = self.predict_proba(frame)?;

        let (labeled, actual): (Vec<f64>, Vec<u8>) = probabilities
            .iter()
            .zip(&frame.targets)
            .filter_map(|(p, target)| target.map(|t| (*p, t)))
            .unzip();
        if actual.is_empty() {
            return Err(ModelError::UndefinedMetric("no labeled rows to evaluate"));
        }

        let confusion = Confusion::from_predictions(
            binarize(Array1::from(labeled).view()).view(),
            Array1::from(actual).view(),
        );
        let roc_auc = confusion.roc_auc()?;
        let score = match (frame.targets.last(), probabilities.iter().last()) {
            (Some(None), Some(p)) => ScoreMapper.map(*p),
            _ => None,
        };

        self.state = PredictorState::Evaluated;
        Ok(EvaluationMetrics {
            accuracy: to_percent(confusion.accuracy()),
            precision: to_percent(confusion.precision()),
            f1: to_percent(confusion.f1()),
            recall: to_percent(confusion.recall()),
            roc_auc: to_percent(roc_auc),
            score,
        })
    }
}
