//! Service configuration loading and types.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use forecast_common::GridGeometry;
use storage::ObjectStorageConfig;

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory of file-system backed payloads.
    pub forecast_path: PathBuf,

    /// Page sizes of the storage query layer.
    #[serde(default)]
    pub paginate: PaginateConfig,

    /// Object storage backing `blob` elements.
    #[serde(default)]
    pub object_storage: Option<ObjectStorageConfig>,

    /// Forecast models and their elements.
    #[serde(default)]
    pub forecasts: Vec<ForecastConfig>,
}

impl ServiceConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {:?}", path))?;

        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse: {:?}", path))?;
        config.apply_env_overrides();
        config.validate()?;

        tracing::info!(
            "Loaded {} forecasts from {:?}",
            config.forecasts.len(),
            path
        );
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Any `S3_*` variable creates the object storage section when missing.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("FORECAST_PATH") {
            self.forecast_path = PathBuf::from(path);
        }

        let s3_keys = [
            "S3_ENDPOINT",
            "S3_BUCKET",
            "S3_ACCESS_KEY",
            "S3_SECRET_KEY",
            "S3_REGION",
            "S3_ALLOW_HTTP",
            "STAGING_DIR",
        ];
        if self.object_storage.is_none() && s3_keys.iter().any(|key| lookup(key).is_some()) {
            self.object_storage = Some(ObjectStorageConfig::default());
        }

        if let Some(storage) = self.object_storage.as_mut() {
            if let Some(endpoint) = lookup("S3_ENDPOINT") {
                storage.endpoint = endpoint;
            }
            if let Some(bucket) = lookup("S3_BUCKET") {
                storage.bucket = bucket;
            }
            if let Some(key) = lookup("S3_ACCESS_KEY") {
                storage.access_key_id = key;
            }
            if let Some(secret) = lookup("S3_SECRET_KEY") {
                storage.secret_access_key = secret;
            }
            if let Some(region) = lookup("S3_REGION") {
                storage.region = region;
            }
            if let Some(allow_http) = lookup("S3_ALLOW_HTTP") {
                storage.allow_http = matches!(allow_http.as_str(), "1" | "true" | "TRUE" | "yes");
            }
            if let Some(dir) = lookup("STAGING_DIR") {
                storage.staging_dir = PathBuf::from(dir);
            }
        }
    }

    /// Check names and geometries.
    pub fn validate(&self) -> Result<()> {
        if self.paginate.default > self.paginate.max {
            bail!(
                "Default page size {} exceeds maximum {}",
                self.paginate.default,
                self.paginate.max
            );
        }

        let mut forecast_names = HashSet::new();
        for forecast in &self.forecasts {
            if !forecast_names.insert(forecast.name.as_str()) {
                bail!("Duplicate forecast: {}", forecast.name);
            }

            forecast
                .geometry()
                .validate()
                .with_context(|| format!("Invalid geometry for forecast {}", forecast.name))?;

            let mut element_names = HashSet::new();
            for element in &forecast.elements {
                if !element_names.insert(element.name.as_str()) {
                    bail!("Duplicate element {} in forecast {}", element.name, forecast.name);
                }
            }
        }

        Ok(())
    }

    /// Find a forecast by name.
    pub fn find_forecast(&self, name: &str) -> Option<&ForecastConfig> {
        self.forecasts.iter().find(|f| f.name == name)
    }
}

/// Page size limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginateConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for PaginateConfig {
    fn default() -> Self {
        Self {
            default: 10,
            max: 50,
        }
    }
}

/// A forecast model and its grid placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Forecast identifier (e.g., "arpege-world").
    pub name: String,

    /// Producing model (e.g., "arpege").
    #[serde(default)]
    pub model: String,

    pub bounds: [f64; 4],
    pub origin: [f64; 2],
    pub size: [usize; 2],
    pub resolution: [f64; 2],

    #[serde(default)]
    pub elements: Vec<ElementConfig>,
}

impl ForecastConfig {
    pub fn geometry(&self) -> GridGeometry {
        GridGeometry::new(self.bounds, self.origin, self.size, self.resolution)
    }
}

/// One forecast element (e.g., temperature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementConfig {
    pub name: String,

    /// Where the element's payloads live.
    #[serde(default)]
    pub data_store: DataStore,
}

/// Payload storage kind of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataStore {
    /// Samples inline in the record store.
    #[default]
    Db,
    /// JSON payload files under `forecast_path`.
    Fs,
    /// Payloads in object storage, staged locally before reading.
    #[serde(alias = "gridfs")]
    Blob,
}

impl DataStore {
    /// Whether payloads live outside the record store.
    pub fn is_external(&self) -> bool {
        matches!(self, DataStore::Fs | DataStore::Blob)
    }
}
