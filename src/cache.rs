use crate::models::{round2, EngineeredRow, TickerDataset};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};
use serde_json::{Map, Number, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const DATE_KEY: &str = "date";
const PRICE_DATE_KEY: &str = "priceDate";
const PRICE_KEY: &str = "price";
const TARGET_KEY: &str = "Target";
const RESERVED_KEYS: [&str; 4] = [DATE_KEY, PRICE_DATE_KEY, PRICE_KEY, TARGET_KEY];

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedDataset {
    Hit(TickerDataset),
    /// A file exists but could not be decoded or holds no rows.
    Unreadable,
    Miss,
}

/// One JSON record list per ticker under `dir`. Files are never rewritten
/// once present.
#[derive(Debug, Clone)]
pub struct DatasetCache {
    dir: PathBuf,
}

impl DatasetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", ticker))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.path_for(ticker).is_file()
    }

    pub fn load(&self, ticker: &str) -> CachedDataset {
        let path = self.path_for(ticker);
        if !path.is_file() {
            return CachedDataset::Miss;
        }
        match read_dataset(&path, ticker) {
            Ok(dataset) if !dataset.is_empty() => CachedDataset::Hit(dataset),
            Ok(_) => {
                debug!("{}: cached dataset at {} is empty", ticker, path.display());
                CachedDataset::Unreadable
            }
            Err(err) => {
                warn!("{}: cached dataset unreadable: {:#}", ticker, err);
                CachedDataset::Unreadable
            }
        }
    }

    /// Persists a non-empty dataset. Returns `false` without writing when
    /// the dataset is empty or a cache file already exists.
    pub fn store(&self, dataset: &TickerDataset) -> Result<bool> {
        if dataset.is_empty() {
            return Ok(false);
        }
        let path = self.path_for(&dataset.ticker);
        if path.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;

        let records = dataset
            .rows
            .iter()
            .map(|row| encode_row(&dataset.feature_names, row))
            .collect::<Result<Vec<_>>>()?;

        let tmp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        let file = File::create(&tmp_path)
            .with_context(|| format!("Unable to create cache file {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &records)
            .with_context(|| format!("Failed to serialize dataset for {}", dataset.ticker))?;
        writer
            .flush()
            .context("Failed to flush cached dataset to disk")?;
        drop(writer);
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move cache file into {}", path.display()))?;
        Ok(true)
    }
}

fn number(value: f64) -> Result<Value> {
    Number::from_f64(round2(value))
        .map(Value::Number)
        .ok_or_else(|| anyhow!("non-finite value {} cannot be cached", value))
}

fn encode_row(feature_names: &[String], row: &EngineeredRow) -> Result<Value> {
    let mut object = Map::new();
    object.insert(DATE_KEY.into(), Value::String(row.date.to_string()));
    object.insert(PRICE_DATE_KEY.into(), Value::String(row.price_date.to_string()));
    object.insert(PRICE_KEY.into(), number(row.price)?);
    for (name, value) in feature_names.iter().zip(&row.features) {
        object.insert(name.clone(), number(*value)?);
    }
    object.insert(TARGET_KEY.into(), row.target.map_or(Value::Null, Value::from));
    Ok(Value::Object(object))
}

fn read_dataset(path: &Path, ticker: &str) -> Result<TickerDataset> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let records: Vec<Map<String, Value>> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid cached dataset {}", path.display()))?;

    let mut dataset = TickerDataset::empty(ticker);
    let Some(first) = records.first() else {
        return Ok(dataset);
    };
    let mut feature_names: Vec<String> = first
        .keys()
        .filter(|key| !RESERVED_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    feature_names.sort();

    for (idx, record) in records.iter().enumerate() {
        let date = read_date(record, DATE_KEY).with_context(|| format!("row {}", idx))?;
        let price_date =
            read_date(record, PRICE_DATE_KEY).with_context(|| format!("row {}", idx))?;
        let price = read_number(record, PRICE_KEY).with_context(|| format!("row {}", idx))?;
        let features = feature_names
            .iter()
            .map(|name| read_number(record, name))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("row {}", idx))?;
        let target = match record.get(TARGET_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(0) => Some(0),
                Some(1) => Some(1),
                _ => return Err(anyhow!("row {}: invalid Target {}", idx, value)),
            },
        };
        dataset.rows.push(EngineeredRow {
            date,
            price_date,
            price,
            features,
            target,
        });
    }
    dataset.feature_names = feature_names;
    Ok(dataset)
}

fn read_date(record: &Map<String, Value>, key: &str) -> Result<NaiveDate> {
    let raw = record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing {}", key))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid {} {}", key, raw))
}

fn read_number(record: &Map<String, Value>, key: &str) -> Result<f64> {
    record
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing numeric {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TickerDataset {
        let day = |d| NaiveDate::from_ymd_opt(2021, 3, d).unwrap();
        TickerDataset {
            ticker: "AAA".into(),
            feature_names: vec!["a_to_b".into(), "revenue".into()],
            rows: vec![
                EngineeredRow {
                    date: day(31),
                    price_date: day(30),
                    price: 12.5,
                    features: vec![0.33, 1200.0],
                    target: Some(1),
                },
                EngineeredRow {
                    date: day(31),
                    price_date: day(31),
                    price: 13.0,
                    features: vec![-2.1, 1250.75],
                    target: None,
                },
            ],
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        let dataset = sample();
        assert!(cache.store(&dataset).unwrap());
        assert_eq!(cache.load("AAA"), CachedDataset::Hit(dataset.clone()));
        assert!(!cache.store(&dataset).unwrap());
    }

    #[test]
    fn corrupt_or_empty_files_are_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        fs::write(cache.path_for("BAD"), "{not json").unwrap();
        fs::write(cache.path_for("EMPTY"), "[]").unwrap();
        assert_eq!(cache.load("BAD"), CachedDataset::Unreadable);
        assert_eq!(cache.load("EMPTY"), CachedDataset::Unreadable);
        assert_eq!(cache.load("NONE"), CachedDataset::Miss);
    }

    #[test]
    fn empty_dataset_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        assert!(!cache.store(&TickerDataset::empty("AAA")).unwrap());
        assert!(!cache.contains("AAA"));
    }
}
