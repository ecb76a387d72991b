//! Storage abstractions for forecast services.
//!
//! Provides unified interfaces for:
//! - Payload byte stores (local file system, MinIO/S3, staged blob copies)
//! - The forecast-run catalog (in memory or PostgreSQL)

pub mod byte_store;
pub mod catalog;
pub mod filesystem;
pub mod object_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, StagedObjectStore};
pub use byte_store::{ByteStore, StagingStore};
pub use catalog::{ForecastCatalog, ForecastRun, PgCatalog, RunCatalog};
pub use filesystem::FilesystemStore;
