//! Forecast payloads on a local or mounted file system.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use forecast_common::{ForecastError, ForecastResult};

use crate::byte_store::ByteStore;

/// Byte store rooted at the configured forecast directory.
///
/// Relative locators are joined onto the root, absolute locators are used
/// as-is.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator to a file path.
    pub fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl ByteStore for FilesystemStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn fetch(&self, locator: &str) -> ForecastResult<Bytes> {
        let path = self.resolve(locator);

        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ForecastError::NotFound(format!("{}", path.display()))
            }
            _ => ForecastError::Storage(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        debug!(size = data.len(), "Read payload file");
        Ok(Bytes::from(data))
    }
}
