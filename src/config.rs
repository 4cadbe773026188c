use crate::dataset::DatasetOptions;
use crate::predictor::booster::BoostingParams;
use crate::predictor::reducer::{DEFAULT_MAX_COMPONENTS, DEFAULT_VARIANCE_RATIO};
use crate::results::QualityGate;
use crate::split::DatasetSplitter;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Classifier and reducer hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub boosting: BoostingParams,
    pub variance_ratio: f64,
    pub max_components: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            boosting: BoostingParams::default(),
            variance_ratio: DEFAULT_VARIANCE_RATIO,
            max_components: DEFAULT_MAX_COMPONENTS,
        }
    }
}

/// Runtime settings, read from the process environment.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fmp_api_key: Option<String>,
    pub database_url: Option<String>,
    pub data_root: PathBuf,
    pub price_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub model_path: PathBuf,
    pub results_dir: PathBuf,
    pub test_fraction: f64,
    pub chunk_size: usize,
    pub min_aligned_rows: usize,
    pub max_align_attempts: u32,
    pub min_report_year: i32,
    pub shuffle_seed: u64,
    pub min_market_cap: f64,
    pub quality_min: f64,
    pub quality_max: f64,
}

impl PipelineSettings {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars().collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let test_fraction =
            setting_f64_or(settings, "AI_SCORE_TEST_FRACTION", 0.2, Some(0.0), Some(0.9))?;
        let chunk_size = setting_usize_or(settings, "AI_SCORE_CHUNK_SIZE", 100, 1)?;
        let min_aligned_rows = setting_usize_or(settings, "AI_SCORE_MIN_ALIGNED_ROWS", 50, 2)?;
        let max_align_attempts =
            setting_usize_or(settings, "AI_SCORE_MAX_ALIGN_ATTEMPTS", 10, 1)?;
        let min_report_year = setting_i32_or(settings, "AI_SCORE_MIN_REPORT_YEAR", 2000, 1900)?;
        let shuffle_seed = setting_usize_or(settings, "AI_SCORE_SHUFFLE_SEED", 42, 0)?;
        let min_market_cap =
            setting_f64_or(settings, "AI_SCORE_MIN_MARKET_CAP", 500e6, Some(0.0), None)?;
        let quality_min =
            setting_f64_or(settings, "AI_SCORE_QUALITY_MIN", 50.0, Some(0.0), Some(100.0))?;
        let quality_max =
            setting_f64_or(settings, "AI_SCORE_QUALITY_MAX", 100.0, Some(0.0), Some(100.0))?;

        if quality_max <= quality_min {
            return Err(anyhow!(
                "AI_SCORE_QUALITY_MAX ({}) must be > AI_SCORE_QUALITY_MIN ({})",
                quality_max,
                quality_min
            ));
        }
        let max_align_attempts = u32::try_from(max_align_attempts).map_err(|_| {
            anyhow!(
                "Setting AI_SCORE_MAX_ALIGN_ATTEMPTS is too large (value: {})",
                max_align_attempts
            )
        })?;

        Ok(Self {
            fmp_api_key: optional_setting(settings, "FMP_API_KEY"),
            database_url: optional_setting(settings, "DATABASE_URL"),
            data_root: setting_path_or(settings, "AI_SCORE_DATA_ROOT", "json"),
            price_dir: optional_setting(settings, "AI_SCORE_PRICE_DIR").map(PathBuf::from),
            cache_dir: setting_path_or(settings, "AI_SCORE_CACHE_DIR", "ml_models/training_data/ai-score"),
            model_path: setting_path_or(
                settings,
                "AI_SCORE_MODEL_PATH",
                "ml_models/weights/ai-score/warm_start_weights.bin",
            ),
            results_dir: setting_path_or(settings, "AI_SCORE_RESULTS_DIR", "json/ai-score/companies"),
            test_fraction,
            chunk_size,
            min_aligned_rows,
            max_align_attempts,
            min_report_year,
            shuffle_seed: shuffle_seed as u64,
            min_market_cap,
            quality_min,
            quality_max,
        })
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            min_aligned_rows: self.min_aligned_rows,
            min_report_year: self.min_report_year,
            max_align_attempts: self.max_align_attempts,
        }
    }

    pub fn splitter(&self) -> DatasetSplitter {
        DatasetSplitter::new(self.test_fraction, self.shuffle_seed)
    }

    pub fn quality_gate(&self) -> QualityGate {
        QualityGate::new(self.quality_min, self.quality_max)
    }

    pub fn require_fmp_api_key(&self) -> Result<&str> {
        self.fmp_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Missing required setting FMP_API_KEY"))
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("Missing required setting DATABASE_URL"))
    }
}

fn optional_setting(settings: &HashMap<String, String>, key: &str) -> Option<String> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn setting_path_or(settings: &HashMap<String, String>, key: &str, default: &str) -> PathBuf {
    PathBuf::from(optional_setting(settings, key).unwrap_or_else(|| default.to_string()))
}

fn setting_f64_or(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn setting_usize_or(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value as usize)
}

fn setting_i32_or(
    settings: &HashMap<String, String>,
    key: &str,
    default: i32,
    min: i32,
) -> Result<i32> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<i32>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}
