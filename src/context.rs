use crate::cache::DatasetCache;
use crate::config::{ModelConfig, PipelineSettings};
use crate::dataset::DatasetBuilder;
use crate::predictor::artifact::ArtifactStore;
use crate::prices::{HttpPriceFetcher, JsonFilePriceFetcher, PriceSource};
use crate::results::ResultWriter;
use crate::statements::FileStatementLoader;
use crate::universe::UniverseStore;
use anyhow::Result;
use log::info;

pub type PipelineBuilder = DatasetBuilder<FileStatementLoader, PriceSource>;

/// Settings plus the factories every command needs.
#[derive(Clone)]
pub struct AppContext {
    settings: PipelineSettings,
    model: ModelConfig,
}

impl AppContext {
    pub fn new(settings: PipelineSettings, model: ModelConfig) -> Self {
        Self { settings, model }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model
    }

    pub fn price_source(&self, skip_downloading: bool) -> Result<PriceSource> {
        if skip_downloading {
            return Ok(PriceSource::Offline);
        }
        if let Some(dir) = self.settings.price_dir.as_ref() {
            info!("Reading price histories from {}", dir.display());
            return Ok(PriceSource::Files(JsonFilePriceFetcher::new(dir.clone())));
        }
        let api_key = self.settings.require_fmp_api_key()?;
        Ok(PriceSource::Http(HttpPriceFetcher::new(api_key)?))
    }

    pub fn dataset_builder(&self, skip_downloading: bool) -> Result<PipelineBuilder> {
        Ok(DatasetBuilder::new(
            FileStatementLoader::new(self.settings.data_root.clone()),
            self.price_source(skip_downloading)?,
            DatasetCache::new(self.settings.cache_dir.clone()),
            self.settings.dataset_options(),
        ))
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.settings.model_path.clone())
    }

    pub fn result_writer(&self) -> ResultWriter {
        ResultWriter::new(self.settings.results_dir.clone())
    }

    pub async fn universe(&self) -> Result<UniverseStore> {
        UniverseStore::new(self.settings.require_database_url()?).await
    }
}
