//! Forecast query handling
//!
//! - [`value`]: tagged query trees parsed from client JSON
//! - [`resolver`]: nearest stored forecast time for an instant or range
//! - [`normalize`]: the normalization pipeline producing the canonical query
//!   and the request-scoped parameters

pub mod normalize;
pub mod resolver;
pub mod value;

pub use normalize::{normalize_query, NormalizeContext, RequestParams};
pub use resolver::{nearest_forecast_range, nearest_forecast_time};
pub use value::{ComparisonOp, GeometryFilter, Query, QueryValue};
