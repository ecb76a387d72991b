//! Placement metadata for forecast grids.

use serde::{Deserialize, Serialize};

use crate::{ForecastError, ForecastResult};

/// Geographic placement of a regular lat/lon forecast grid.
///
/// The geometry is static for a forecast model and shared by every item of
/// its elements; only the sample data changes from item to item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// West, south, east, north in degrees
    pub bounds: [f64; 4],
    /// Longitude, latitude of the north-west corner of cell [0, 0]
    pub origin: [f64; 2],
    /// Number of columns, number of rows
    pub size: [usize; 2],
    /// Degrees per cell in longitude, latitude
    pub resolution: [f64; 2],
}

impl GridGeometry {
    /// Create a new grid geometry.
    pub fn new(bounds: [f64; 4], origin: [f64; 2], size: [usize; 2], resolution: [f64; 2]) -> Self {
        Self {
            bounds,
            origin,
            size,
            resolution,
        }
    }

    /// Check the geometry is usable for lookups.
    pub fn validate(&self) -> ForecastResult<()> {
        if self.size[0] == 0 || self.size[1] == 0 {
            return Err(ForecastError::InvalidGrid(format!(
                "grid size must be at least 1x1, got {}x{}",
                self.size[0], self.size[1]
            )));
        }

        if !self.resolution.iter().all(|r| r.is_finite() && *r > 0.0) {
            return Err(ForecastError::InvalidGrid(format!(
                "grid resolution must be positive, got {:?}",
                self.resolution
            )));
        }

        if !self.origin.iter().chain(self.bounds.iter()).all(|v| v.is_finite()) {
            return Err(ForecastError::InvalidGrid(
                "grid origin and bounds must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of columns.
    pub fn columns(&self) -> usize {
        self.size[0]
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.size[1]
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.size[0] * self.size[1]
    }

    /// Check if the grid holds no cells.
    pub fn is_empty(&self) -> bool {
        self.size[0] == 0 || self.size[1] == 0
    }

    /// Width of the grid in degrees of longitude.
    pub fn longitude_span(&self) -> f64 {
        self.size[0] as f64 * self.resolution[0]
    }

    /// Whether the columns cover the whole 360 degree circle.
    pub fn covers_full_longitude(&self) -> bool {
        (self.longitude_span() - 360.0).abs() < 1e-6
    }
}

/// Largest raster a resampling request may produce, in cells.
pub const MAX_RESAMPLE_CELLS: usize = 4096 * 4096;

/// Request-scoped resampling parameters.
///
/// Extracted from the `oLon/oLat`, `sLon/sLat` and `dLon/dLat` query fields;
/// never forwarded to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampleParams {
    /// Longitude, latitude of the north-west corner of the output raster
    pub origin: [f64; 2],
    /// Output cell size in degrees of longitude, latitude
    pub step: [f64; 2],
    /// Output columns, rows
    pub dest_size: [usize; 2],
}

impl ResampleParams {
    pub fn new(origin: [f64; 2], step: [f64; 2], dest_size: [usize; 2]) -> Self {
        Self {
            origin,
            step,
            dest_size,
        }
    }

    /// Number of output cells, `None` on overflow or beyond
    /// [`MAX_RESAMPLE_CELLS`].
    pub fn cell_count(dest_size: [usize; 2]) -> Option<usize> {
        dest_size[0]
            .checked_mul(dest_size[1])
            .filter(|cells| *cells <= MAX_RESAMPLE_CELLS)
    }
}
