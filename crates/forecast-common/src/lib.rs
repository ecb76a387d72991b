//! Common types and utilities shared across the forecast grid crates.

pub mod error;
pub mod geometry;
pub mod item;
pub mod time;

pub use error::{ForecastError, ForecastResult};
pub use geometry::{GridGeometry, ResampleParams, MAX_RESAMPLE_CELLS};
pub use item::{decode_samples, ClientItem, ForecastItem, MinMax};
pub use time::{format_instant, parse_instant, TimeParseError};
