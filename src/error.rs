use chrono::NaiveDate;
use thiserror::Error;

/// Why an entity was left out of a batch. Every variant is entity-local: the
/// batch records it and moves on to the next ticker.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SkipReason {
    #[error("upstream data unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("insufficient data: {found} rows (minimum {required})")]
    InsufficientData { found: usize, required: usize },

    #[error("cached dataset unreadable or empty")]
    CacheUnreadable,

    #[error("no cached dataset and downloading is disabled")]
    NotCached,

    #[error("model stage failed: {0}")]
    Model(String),

    #[error("metrics outside the acceptance band")]
    QualityGateFailed,
}

impl SkipReason {
    /// Stable key used when aggregating skips in a batch report.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::UpstreamUnavailable(_) => "upstream_unavailable",
            SkipReason::InsufficientData { .. } => "insufficient_data",
            SkipReason::CacheUnreadable => "cache_unreadable",
            SkipReason::NotCached => "not_cached",
            SkipReason::Model(_) => "model",
            SkipReason::QualityGateFailed => "quality_gate_failed",
        }
    }
}

/// A report date that found no trading date inside the look-back window.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no trading date within {max_attempts} days before {report_date}")]
pub struct AlignmentMiss {
    pub report_date: NaiveDate,
    pub max_attempts: u32,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model has not been fitted yet")]
    NotFitted,

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("feature columns differ from the warm-start artifact ({0})")]
    FeatureMismatch(String),

    #[error("empty training set")]
    EmptyTrainingSet,

    #[error("no warm-start artifact at {0}")]
    MissingArtifact(String),

    #[error("metric undefined: {0}")]
    UndefinedMetric(&'static str),

    #[error("artifact io: {0}")]
    Artifact(String),
}

impl From<ModelError> for SkipReason {
    fn from(err: ModelError) -> Self {
        SkipReason::Model(err.to_string())
    }
}
