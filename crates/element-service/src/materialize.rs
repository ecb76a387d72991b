//! Turning stored item records into client items.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, instrument, warn};

use forecast_common::{
    decode_samples, format_instant, ClientItem, ForecastError, ForecastItem, ForecastResult,
};
use forecast_query::{Query, RequestParams};
use grid_processor::Grid;
use storage::StagingStore;

use crate::element::{ForecastElementService, PayloadSource};

const DATA_FIELD: &str = "data";

/// Payload loads in flight per batch.
const MAX_CONCURRENT_LOADS: usize = 16;

/// Outcome of materializing a batch of items, one result per item in input
/// order.
#[derive(Debug)]
pub struct Materialized {
    pub items: Vec<ForecastResult<ClientItem>>,
}

impl Materialized {
    /// All client items, or the first failure.
    pub fn into_items(self) -> ForecastResult<Vec<ClientItem>> {
        self.items.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that could not be materialized.
    pub fn failures(&self) -> usize {
        self.items.iter().filter(|r| r.is_err()).count()
    }
}

impl ForecastElementService {
    /// Load payloads, resample and strip storage locators.
    ///
    /// Payloads are only read for external storage when `data` is selected.
    /// Loads run concurrently and a failed load only fails its own item.
    /// Staged copies are released once every load has completed, or in the
    /// background if the batch is dropped before that.
    #[instrument(
        skip_all,
        fields(forecast = %self.forecast, element = %self.element, count = items.len())
    )]
    pub async fn materialize(
        &self,
        items: Vec<ForecastItem>,
        query: &Query,
        params: &RequestParams,
    ) -> Materialized {
        let select_data = query.selects(DATA_FIELD);
        let staged = StagedCopies::new(&self.source);

        let items: Vec<_> = stream::iter(items)
            .map(|item| self.materialize_one(item, select_data, params, &staged))
            .buffered(MAX_CONCURRENT_LOADS)
            .collect()
            .await;
        staged.release_all().await;

        let materialized = Materialized { items };
        debug!(failures = materialized.failures(), "Materialized items");
        materialized
    }

    /// Materialize one item. Staged copies are recorded in `staged`.
    async fn materialize_one(
        &self,
        mut item: ForecastItem,
        select_data: bool,
        params: &RequestParams,
        staged: &StagedCopies,
    ) -> ForecastResult<ClientItem> {
        if select_data && self.is_external_storage() {
            if let Some(locator) = item.converted_file_path.clone() {
                match self.load_payload(&locator, staged).await {
                    Ok(data) => item.data = Some(data),
                    Err(e) => return Err(self.unavailable(&item, &locator, e)),
                }
            }
        }

        let mut client = item.into_client();
        if !select_data {
            client.data = None;
        }

        if let (Some(resample), Some(data)) = (params.resample.as_ref(), client.data.take()) {
            let data = Grid::new(*self.geometry, data)?.resample_with(resample)?;
            client.stats = Some(Grid::min_max(&data));
            client.data = Some(data);
        }

        Ok(client)
    }

    async fn load_payload(
        &self,
        locator: &str,
        staged: &StagedCopies,
    ) -> ForecastResult<Vec<f64>> {
        let bytes = match &self.source {
            PayloadSource::Bytes(store) => store.fetch(locator).await?,
            PayloadSource::Staged(store) => {
                let path = store.stage(locator).await?;
                staged.track(path.clone());
                store.read(&path).await?
            }
            PayloadSource::Inline => {
                return Err(ForecastError::Internal(format!(
                    "no byte store to read {}",
                    locator
                )))
            }
        };
        Ok(decode_samples(&bytes)?)
    }

    fn unavailable(
        &self,
        item: &ForecastItem,
        locator: &str,
        reason: ForecastError,
    ) -> ForecastError {
        let forecast_time = format_instant(&item.forecast_time);
        let run_time = format_instant(&item.run_time);

        error!(
            forecast = %self.forecast,
            element = %self.element,
            forecast_time = %forecast_time,
            run_time = %run_time,
            error = %reason,
            "Cannot read converted forecast"
        );
        debug!(locator, "Unreadable payload");

        ForecastError::data_unavailable(
            self.forecast.clone(),
            self.element.clone(),
            forecast_time,
            run_time,
            reason.to_string(),
        )
    }
}

/// Staged copies of one batch.
///
/// Copies still held when the guard is dropped are released on a background
/// task.
struct StagedCopies {
    store: Option<Arc<dyn StagingStore>>,
    paths: Mutex<Vec<PathBuf>>,
}

impl StagedCopies {
    fn new(source: &PayloadSource) -> Self {
        let store = match source {
            PayloadSource::Staged(store) => Some(store.clone()),
            _ => None,
        };
        Self {
            store,
            paths: Mutex::new(Vec::new()),
        }
    }

    fn track(&self, path: PathBuf) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }

    fn take(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn release_all(&self) {
        if let Some(store) = &self.store {
            release(store.as_ref(), self.take()).await;
        }
    }
}

impl Drop for StagedCopies {
    fn drop(&mut self) {
        let paths = self.take();
        if paths.is_empty() {
            return;
        }
        let Some(store) = self.store.clone() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(count = paths.len(), "Releasing staged payloads of a dropped batch");
                handle.spawn(async move { release(store.as_ref(), paths).await });
            }
            Err(_) => warn!(count = paths.len(), "No runtime to release staged payloads"),
        }
    }
}

async fn release(store: &dyn StagingStore, paths: Vec<PathBuf>) {
    for path in paths {
        if let Err(e) = store.release(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to release staged payload");
        }
    }
}
