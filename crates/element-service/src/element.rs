//! Forecast element services and the registry that builds them from config.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use forecast_common::{ClientItem, ForecastError, ForecastResult, GridGeometry};
use forecast_query::{normalize_query, NormalizeContext, Query, RequestParams};
use storage::{
    ByteStore, FilesystemStore, ForecastCatalog, ObjectStorage, ObjectStorageConfig,
    StagedObjectStore, StagingStore,
};

use crate::config::{DataStore, ElementConfig, ForecastConfig, PaginateConfig, ServiceConfig};
use crate::item_store::{ItemStore, Pagination};

/// Where an element's raster payloads are read from.
#[derive(Clone)]
pub enum PayloadSource {
    /// Samples are stored inline in the records.
    Inline,
    /// Payloads are fetched directly by locator.
    Bytes(Arc<dyn ByteStore>),
    /// Payloads are staged to local storage, read, then released.
    Staged(Arc<dyn StagingStore>),
}

impl PayloadSource {
    fn kind(&self) -> &'static str {
        match self {
            PayloadSource::Inline => "inline",
            PayloadSource::Bytes(_) => "bytes",
            PayloadSource::Staged(_) => "staged",
        }
    }
}

/// Serves the items of one element of one forecast model.
pub struct ForecastElementService {
    pub(crate) forecast: String,
    pub(crate) element: String,
    pub(crate) data_store: DataStore,
    pub(crate) geometry: Arc<GridGeometry>,
    pub(crate) source: PayloadSource,
    catalog: Arc<dyn ForecastCatalog>,
    items: Arc<dyn ItemStore>,
    pagination: PaginateConfig,
}

impl ForecastElementService {
    pub fn new(
        forecast: impl Into<String>,
        element: impl Into<String>,
        data_store: DataStore,
        geometry: Arc<GridGeometry>,
        source: PayloadSource,
        catalog: Arc<dyn ForecastCatalog>,
        items: Arc<dyn ItemStore>,
    ) -> Self {
        Self {
            forecast: forecast.into(),
            element: element.into(),
            data_store,
            geometry,
            source,
            catalog,
            items,
            pagination: PaginateConfig::default(),
        }
    }

    pub fn with_pagination(mut self, pagination: PaginateConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn forecast(&self) -> &str {
        &self.forecast
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn data_store(&self) -> DataStore {
        self.data_store
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    pub fn is_external_storage(&self) -> bool {
        self.data_store.is_external()
    }

    /// Normalize a raw client query against this element's catalog.
    pub fn normalize(
        &self,
        raw: Value,
        tile_query: bool,
    ) -> ForecastResult<(Query, RequestParams)> {
        let forecast_times = self.catalog.list_forecast_times();
        let ctx = NormalizeContext {
            forecast_times: &forecast_times,
            external_storage: self.is_external_storage(),
            tile_query,
        };
        normalize_query(raw, &ctx)
    }

    /// Query forecast sample items.
    pub async fn find(&self, raw: Value) -> ForecastResult<Vec<ClientItem>> {
        self.run_query(raw, false).await
    }

    /// Query raster tile items: ungeometried records unless a geometry
    /// predicate is given.
    pub async fn find_tiles(&self, raw: Value) -> ForecastResult<Vec<ClientItem>> {
        self.run_query(raw, true).await
    }

    #[instrument(skip(self, raw), fields(forecast = %self.forecast, element = %self.element))]
    async fn run_query(&self, raw: Value, tile_query: bool) -> ForecastResult<Vec<ClientItem>> {
        let (mut query, params) = self.normalize(raw, tile_query)?;
        let pagination = Pagination::take_from(&mut query, &self.pagination, params.paginate);

        let items = self.items.find(&query, pagination).await?;
        debug!(count = items.len(), "Loaded items");

        self.materialize(items, &query, &params).await.into_items()
    }
}

/// Record store and catalog of one element.
pub struct ElementBackends {
    pub catalog: Arc<dyn ForecastCatalog>,
    pub items: Arc<dyn ItemStore>,
}

/// Element services keyed by forecast and element name.
pub struct ServiceRegistry {
    services: HashMap<(String, String), Arc<ForecastElementService>>,
}

impl ServiceRegistry {
    /// Build a service for every configured element.
    ///
    /// Elements of a forecast share one geometry; file-system elements share
    /// one store rooted at `forecast_path`. `blob` elements need
    /// `object_storage`.
    pub fn from_config<F>(
        config: &ServiceConfig,
        object_storage: Option<Arc<ObjectStorage>>,
        mut backends: F,
    ) -> ForecastResult<Self>
    where
        F: FnMut(&ForecastConfig, &ElementConfig) -> ElementBackends,
    {
        let filesystem: Arc<dyn ByteStore> =
            Arc::new(FilesystemStore::new(config.forecast_path.clone()));
        let staging_dir = config
            .object_storage
            .as_ref()
            .map(|storage| storage.staging_dir.clone())
            .unwrap_or_else(|| ObjectStorageConfig::default().staging_dir);

        let mut services = HashMap::new();
        for forecast in &config.forecasts {
            let geometry = Arc::new(forecast.geometry());
            geometry.validate()?;

            for element in &forecast.elements {
                let source = match element.data_store {
                    DataStore::Db => PayloadSource::Inline,
                    DataStore::Fs => PayloadSource::Bytes(filesystem.clone()),
                    DataStore::Blob => {
                        let storage = object_storage.clone().ok_or_else(|| {
                            ForecastError::GeneralConfiguration(format!(
                                "element {}/{} uses blob storage without object storage",
                                forecast.name, element.name
                            ))
                        })?;
                        PayloadSource::Staged(Arc::new(StagedObjectStore::new(
                            storage,
                            staging_dir.clone(),
                        )))
                    }
                };

                let ElementBackends { catalog, items } = backends(forecast, element);
                debug!(
                    forecast = %forecast.name,
                    element = %element.name,
                    source = source.kind(),
                    "Registered element"
                );

                let service = ForecastElementService::new(
                    forecast.name.clone(),
                    element.name.clone(),
                    element.data_store,
                    geometry.clone(),
                    source,
                    catalog,
                    items,
                )
                .with_pagination(config.paginate);

                services.insert(
                    (forecast.name.clone(), element.name.clone()),
                    Arc::new(service),
                );
            }
        }

        info!(services = services.len(), "Element services ready");
        Ok(Self { services })
    }

    pub fn get(&self, forecast: &str, element: &str) -> Option<Arc<ForecastElementService>> {
        self.services
            .get(&(forecast.to_string(), element.to_string()))
            .cloned()
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<ForecastElementService>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Connect to the configured object storage, if any.
pub fn connect_object_storage(
    config: &ServiceConfig,
) -> ForecastResult<Option<Arc<ObjectStorage>>> {
    config
        .object_storage
        .as_ref()
        .map(|storage| ObjectStorage::new(storage).map(Arc::new))
        .transpose()
}
