//! Forecast element services
//!
//! - [`config`]: YAML service configuration with environment overrides
//! - [`item_store`]: the storage query layer seam and page limits
//! - [`element`]: per-element services and the registry building them
//! - [`materialize`]: payload loading, resampling and locator stripping

pub mod config;
pub mod element;
pub mod item_store;
pub mod materialize;

pub use config::{DataStore, ElementConfig, ForecastConfig, PaginateConfig, ServiceConfig};
pub use element::{
    connect_object_storage, ElementBackends, ForecastElementService, PayloadSource,
    ServiceRegistry,
};
pub use item_store::{ItemStore, MemoryItemStore, Pagination};
pub use materialize::Materialized;
