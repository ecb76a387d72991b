//! Regular lat/lon grids for forecast payloads
//!
//! This crate turns a forecast element's grid geometry and a decoded sample
//! payload into a [`Grid`] that answers geographic questions:
//!
//! - **Point lookups**: bilinear interpolation at any longitude/latitude
//! - **Resampling**: project the grid onto a caller-chosen raster
//! - **Statistics**: min/max over the finite samples of a raster
//!
//! # Conventions
//!
//! ```text
//!  origin (lon0, lat0)
//!      ┌──────┬──────┬──────┐
//!      │ 0,0  │ 1,0  │ 2,0  │   row 0 holds the northern edge
//!      ├──────┼──────┼──────┤
//!      │ 0,1  │ 1,1  │ 2,1  │   each sample sits at its cell center
//!      └──────┴──────┴──────┘
//! ```
//!
//! Longitude is periodic, latitude is clamped to the pole rows.
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::Grid;
//!
//! let grid = Grid::new(geometry, samples)?;
//! let value = grid.interpolate(2.35, 48.85)?;
//! let raster = grid.resample([-10.0, 60.0], [256, 256], [0.1, 0.1])?;
//! let stats = Grid::min_max(&raster);
//! ```

pub mod grid;
pub mod interpolation;
pub mod stats;

pub use grid::Grid;
pub use interpolation::bilinear_blend;
pub use stats::min_max;
