//! Raster grid with geographic lookups.

use forecast_common::{
    ForecastError, ForecastResult, GridGeometry, MinMax, ResampleParams, MAX_RESAMPLE_CELLS,
};
use tracing::debug;

use crate::interpolation::{bilinear_blend, clamp_index, longitude_offset, snap_to_node};
use crate::stats;

/// A 2-D raster of samples placed on a regular lat/lon grid.
///
/// Samples are stored row-major, row 0 being the northern edge, and each
/// sample stands for the center of its cell: cell `(col, row)` is centered at
/// `origin.lon + (col + 0.5) * res.lon`, `origin.lat - (row + 0.5) * res.lat`.
/// Missing samples are NaN.
#[derive(Debug, Clone)]
pub struct Grid {
    geometry: GridGeometry,
    data: Vec<f64>,
}

impl Grid {
    /// Build a grid from forecast geometry and loaded sample data.
    pub fn new(geometry: GridGeometry, data: Vec<f64>) -> ForecastResult<Self> {
        geometry.validate()?;

        if data.len() != geometry.len() {
            return Err(ForecastError::InvalidGrid(format!(
                "expected {} samples for a {}x{} grid, got {}",
                geometry.len(),
                geometry.columns(),
                geometry.rows(),
                data.len()
            )));
        }

        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Get the sample stored at a cell.
    pub fn get_value(&self, col: usize, row: usize) -> ForecastResult<f64> {
        let [columns, rows] = self.geometry.size;
        if col >= columns || row >= rows {
            return Err(ForecastError::OutOfRange {
                col,
                row,
                columns,
                rows,
            });
        }
        Ok(self.data[row * columns + col])
    }

    /// Geographic coordinates (lon, lat) of a cell center.
    pub fn cell_center(&self, col: usize, row: usize) -> ForecastResult<(f64, f64)> {
        let [columns, rows] = self.geometry.size;
        if col >= columns || row >= rows {
            return Err(ForecastError::OutOfRange {
                col,
                row,
                columns,
                rows,
            });
        }
        let [res_lon, res_lat] = self.geometry.resolution;
        Ok((
            self.geometry.origin[0] + (col as f64 + 0.5) * res_lon,
            self.geometry.origin[1] - (row as f64 + 0.5) * res_lat,
        ))
    }

    /// Bilinear interpolation at a geographic point.
    ///
    /// Longitude is periodic: it is reduced modulo 360 into the span starting
    /// at the grid origin, so +180 and -180 give the same value. Cell indices
    /// are clamped to the grid extent, which clamps latitudes beyond the
    /// northern or southern edge to the pole rows.
    pub fn interpolate(&self, lon: f64, lat: f64) -> ForecastResult<f64> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(ForecastError::InvalidCoordinate(format!(
                "cannot interpolate at ({}, {})",
                lon, lat
            )));
        }

        let [columns, rows] = self.geometry.size;
        let [res_lon, res_lat] = self.geometry.resolution;

        let cx = snap_to_node(longitude_offset(lon, self.geometry.origin[0]) / res_lon - 0.5);
        let cy = snap_to_node((self.geometry.origin[1] - lat) / res_lat - 0.5);

        let c0 = cx.floor();
        let r0 = cy.floor();
        let fx = cx - c0;
        let fy = cy - r0;

        let c0 = c0 as i64;
        let r0 = r0 as i64;
        let col0 = clamp_index(c0, columns);
        let col1 = clamp_index(c0.saturating_add(1), columns);
        let row0 = clamp_index(r0, rows);
        let row1 = clamp_index(r0.saturating_add(1), rows);

        let at = |col: usize, row: usize| self.data[row * columns + col];

        Ok(bilinear_blend(
            [at(col0, row0), at(col1, row0), at(col0, row1), at(col1, row1)],
            fx,
            fy,
        ))
    }

    /// Resample onto a new raster.
    ///
    /// `origin` is the north-west corner of the output raster, `dest_size`
    /// its columns and rows, and `step` its cell size in degrees. Each output
    /// cell takes the interpolated value at its center. Resampling with the
    /// grid's own origin, size and resolution reproduces its samples.
    ///
    /// The output may hold at most [`MAX_RESAMPLE_CELLS`] cells.
    pub fn resample(
        &self,
        origin: [f64; 2],
        dest_size: [usize; 2],
        step: [f64; 2],
    ) -> ForecastResult<Vec<f64>> {
        let [dest_cols, dest_rows] = dest_size;
        if dest_cols == 0 || dest_rows == 0 {
            return Err(ForecastError::InvalidGrid(format!(
                "resample size must be at least 1x1, got {}x{}",
                dest_cols, dest_rows
            )));
        }
        if !step.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(ForecastError::InvalidGrid(format!(
                "resample step must be positive, got {:?}",
                step
            )));
        }

        let cells = ResampleParams::cell_count(dest_size).ok_or_else(|| {
            ForecastError::InvalidGrid(format!(
                "resample size {}x{} exceeds {} cells",
                dest_cols, dest_rows, MAX_RESAMPLE_CELLS
            ))
        })?;

        debug!(
            dest_cols,
            dest_rows,
            step_lon = step[0],
            step_lat = step[1],
            "Resampling grid"
        );

        let mut output = Vec::with_capacity(cells);
        for row in 0..dest_rows {
            let lat = origin[1] - (row as f64 + 0.5) * step[1];
            for col in 0..dest_cols {
                let lon = origin[0] + (col as f64 + 0.5) * step[0];
                output.push(self.interpolate(lon, lat)?);
            }
        }

        Ok(output)
    }

    /// Resample using request-scoped parameters.
    pub fn resample_with(&self, params: &ResampleParams) -> ForecastResult<Vec<f64>> {
        self.resample(params.origin, params.dest_size, params.step)
    }

    /// Minimum and maximum over a sample sequence, ignoring missing samples.
    pub fn min_max(data: &[f64]) -> MinMax {
        stats::min_max(data)
    }
}
