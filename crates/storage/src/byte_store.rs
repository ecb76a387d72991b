//! Byte-source seams used to load raster payloads.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use forecast_common::ForecastResult;

/// A byte-addressable store from which a payload is fetched by locator.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Fetch the whole payload stored at `locator`.
    async fn fetch(&self, locator: &str) -> ForecastResult<Bytes>;
}

/// A blob store read in two steps: copy the blob to local storage, then read
/// the local copy.
///
/// Every path returned by [`StagingStore::stage`] must eventually be passed to
/// [`StagingStore::release`].
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Copy the blob at `locator` into local storage, returning the copy's path.
    async fn stage(&self, locator: &str) -> ForecastResult<PathBuf>;

    /// Read a staged copy.
    async fn read(&self, path: &Path) -> ForecastResult<Bytes>;

    /// Delete a staged copy. Releasing a path that no longer exists succeeds.
    async fn release(&self, path: &Path) -> ForecastResult<()>;
}
