use super::booster::GradientBoostedClassifier;
use super::reducer::PcaReducer;
use super::scaler::MinMaxScaler;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const MODEL_ARTIFACT_VERSION: u32 = 2;

/// Everything needed to score new rows: the training column order, fitted
/// preprocessing and the boosted trees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub scaler: MinMaxScaler,
    pub reducer: PcaReducer,
    pub classifier: GradientBoostedClassifier,
}

impl ModelArtifact {
    pub fn new(
        feature_names: Vec<String>,
        scaler: MinMaxScaler,
        reducer: PcaReducer,
        classifier: GradientBoostedClassifier,
    ) -> Self {
        Self {
            version: MODEL_ARTIFACT_VERSION,
            created_at: Utc::now(),
            feature_names,
            scaler,
            reducer,
            classifier,
        }
    }
}

/// The single warm-start slot on disk. Saving needs `&mut self`, so only the
/// holder of a mutable store can overwrite the shared artifact.
#[derive(Debug)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// `Ok(None)` when no artifact has been written yet.
    pub fn load(&self) -> Result<Option<ModelArtifact>> {
        if !self.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path).with_context(|| {
            format!("Failed to open model artifact at {}", self.path.display())
        })?;
        let artifact: ModelArtifact = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Model artifact decode failed for {}", self.path.display()))?;

        if artifact.version != MODEL_ARTIFACT_VERSION {
            return Err(anyhow!(
                "Model artifact version mismatch (found {}, expected {})",
                artifact.version,
                MODEL_ARTIFACT_VERSION
            ));
        }
        debug!(
            "Loaded model artifact from {} ({} trees, created {})",
            self.path.display(),
            artifact.classifier.num_trees(),
            artifact.created_at
        );
        Ok(Some(artifact))
    }

    pub fn save(&mut self, artifact: &ModelArtifact) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create model directory {}", parent.display())
                })?;
            }
        }

        let tmp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        let file = File::create(&tmp_path).with_context(|| {
            format!("Unable to create model artifact at {}", tmp_path.display())
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, artifact)
            .context("Failed to serialize model artifact")?;
        writer
            .flush()
            .context("Failed to flush model artifact to disk")?;
        drop(writer);

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to move model artifact into {}", self.path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::booster::BoostingParams;
    use ndarray::array;

    fn artifact() -> ModelArtifact {
        let x = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5], [0.2, 0.9]];
        let mut scaler = MinMaxScaler::default();
        scaler.fit(x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();
        let mut reducer = PcaReducer::default();
        reducer.fit(scaled.view()).unwrap();
        let reduced = reducer.transform(scaled.view()).unwrap();
        let mut classifier = GradientBoostedClassifier::new(BoostingParams {
            n_estimators: 3,
            min_child_samples: 1,
            ..BoostingParams::default()
        });
        classifier.fit(reduced.view(), array![0, 1, 1, 0].view()).unwrap();
        ModelArtifact::new(vec!["a".into(), "b".into()], scaler, reducer, classifier)
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("weights.bin"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path().join("nested").join("weights.bin"));
        let original = artifact();
        store.save(&original).unwrap();
        assert_eq!(store.load().unwrap(), Some(original));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        fs::write(&path, b"not a model").unwrap();
        assert!(ArtifactStore::new(path).load().is_err());
    }
}
