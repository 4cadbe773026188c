use crate::models::EvaluationMetrics;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Acceptance band for evaluation metrics: every percentage must lie in
/// `[min, max)` before a result is published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    min: f64,
    max: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(50.0, 100.0)
    }
}

impl QualityGate {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn passes(&self, metrics: &EvaluationMetrics) -> bool {
        [
            metrics.accuracy,
            metrics.precision,
            metrics.f1,
            metrics.recall,
            metrics.roc_auc,
        ]
        .iter()
        .all(|value| {
            let value = f64::from(*value);
            value >= self.min && value < self.max
        })
    }
}

/// Writes per-ticker result records.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", ticker))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, ticker: &str, metrics: &EvaluationMetrics) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create results directory {}", self.dir.display())
        })?;
        let path = self.path_for(ticker);
        let body = serde_json::to_vec(metrics).context("Failed to encode evaluation metrics")?;
        fs::write(&path, body)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn metrics(accuracy: u8) -> EvaluationMetrics {
        EvaluationMetrics {
            accuracy,
            precision: 60,
            f1: 58,
            recall: 55,
            roc_auc: 57,
            score: Some(7),
        }
    }

    #[test]
    fn gate_is_half_open() {
        let gate = QualityGate::default();
        assert!(gate.passes(&metrics(50)));
        assert!(gate.passes(&metrics(99)));
        assert!(!gate.passes(&metrics(49)));
        assert!(!gate.passes(&metrics(100)));
    }

    #[test]
    fn written_record_uses_published_keys() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().join("companies"));
        let path = writer.write("AAPL", &metrics(61)).unwrap();
        assert_eq!(path, dir.path().join("companies").join("AAPL.json"));

        let value: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["accuracy", "f1_score", "precision", "recall_score", "roc_auc_score", "score"]
        );
        assert_eq!(value["score"], 7);
    }
}
