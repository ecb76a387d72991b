//! Object storage for forecast payloads (MinIO/S3 compatible).

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use forecast_common::{ForecastError, ForecastResult};

use crate::byte_store::{ByteStore, StagingStore};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
    /// Local directory receiving staged blob copies
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("forecast-staging")
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "forecasts".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
            staging_dir: default_staging_dir(),
        }
    }
}

/// Object storage client for forecast payloads.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> ForecastResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            ForecastError::GeneralConfiguration(format!("Failed to create S3 client: {}", e))
        })?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store, e.g. `object_store::memory::InMemory`.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a path in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> ForecastResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| ForecastError::Storage(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> ForecastResult<Bytes> {
        let location = Path::from(path);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ForecastError::NotFound(path.to_string()),
            e => ForecastError::Storage(format!("Failed to read {}: {}", path, e)),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| ForecastError::Storage(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }
}

#[async_trait]
impl ByteStore for ObjectStorage {
    async fn fetch(&self, locator: &str) -> ForecastResult<Bytes> {
        self.get(locator).await
    }
}

/// Blob store that stages objects as local files before they are read.
pub struct StagedObjectStore {
    storage: Arc<ObjectStorage>,
    staging_dir: PathBuf,
}

impl StagedObjectStore {
    pub fn new(storage: Arc<ObjectStorage>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &std::path::Path {
        &self.staging_dir
    }
}

#[async_trait]
impl StagingStore for StagedObjectStore {
    #[instrument(skip(self), fields(bucket = %self.storage.bucket()))]
    async fn stage(&self, locator: &str) -> ForecastResult<PathBuf> {
        let bytes = self.storage.get(locator).await?;

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self.staging_dir.join(format!("{}.json", Uuid::new_v4()));
        write_staged(&path, &bytes).await?;

        debug!(size = bytes.len(), staged = %path.display(), "Staged object");
        Ok(path)
    }

    async fn read(&self, path: &std::path::Path) -> ForecastResult<Bytes> {
        let data = tokio::fs::read(path).await?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self))]
    async fn release(&self, path: &std::path::Path) -> ForecastResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Released staged copy");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write a staged copy, removing whatever was written if the write fails.
async fn write_staged(path: &std::path::Path, bytes: &[u8]) -> ForecastResult<()> {
    if let Err(e) = tokio::fs::write(path, bytes).await {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove partial copy");
            }
        }
        return Err(e.into());
    }
    Ok(())
}
