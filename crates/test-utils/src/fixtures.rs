//! Common test fixtures for forecast tests.
//!
//! This module provides pre-defined geometries, catalog times and items that
//! represent common scenarios in forecast queries.

/// Common grid geometries for testing.
pub mod geometry {
    use forecast_common::GridGeometry;

    /// The 2x2 world grid used for antimeridian checks, with data
    /// [`super::WORLD_2X2_DATA`]
    pub fn world_2x2() -> GridGeometry {
        GridGeometry::new(
            [-180.0, -90.0, 180.0, 90.0],
            [-180.0, 90.0],
            [2, 2],
            [180.0, 90.0],
        )
    }

    /// Global grid at 0.5 degree resolution
    pub fn world_half_degree() -> GridGeometry {
        GridGeometry::new(
            [-180.0, -90.0, 180.0, 90.0],
            [-180.0, 90.0],
            [720, 360],
            [0.5, 0.5],
        )
    }

    /// Global grid at 10 degree resolution, small enough to scan fully
    pub fn world_coarse() -> GridGeometry {
        GridGeometry::new(
            [-180.0, -90.0, 180.0, 90.0],
            [-180.0, 90.0],
            [36, 18],
            [10.0, 10.0],
        )
    }

    /// Western Europe at 1 degree resolution
    pub fn europe() -> GridGeometry {
        GridGeometry::new([-10.0, 35.0, 30.0, 60.0], [-10.0, 60.0], [40, 25], [1.0, 1.0])
    }
}

/// Samples of the 2x2 world grid, row-major from the north-west cell.
pub const WORLD_2X2_DATA: [f64; 4] = [0.0, 1.0, 1.0, 0.0];

/// Common time values for testing.
pub mod time {
    use chrono::{DateTime, TimeZone, Utc};

    /// A fixed run time for tests (2024-01-01T00:00:00Z)
    pub fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// A run time plus a whole number of hours
    pub fn hours(h: i64) -> DateTime<Utc> {
        run_time() + chrono::Duration::hours(h)
    }

    /// Three-hourly forecast times 00:00, 03:00, 06:00 and 09:00
    pub fn three_hourly() -> Vec<DateTime<Utc>> {
        vec![hours(0), hours(3), hours(6), hours(9)]
    }
}

/// Common forecast and element names for testing.
pub mod names {
    pub const FORECAST: &str = "arpege-world";
    pub const TEMPERATURE: &str = "temperature";
    pub const WIND: &str = "wind";
}

/// Builds an item for the fixture run at `forecast_hour`, pointing to the
/// converted payload `converted/<hour>.json`.
pub fn converted_item(forecast_hour: i64) -> forecast_common::ForecastItem {
    forecast_common::ForecastItem::new(time::run_time(), time::hours(forecast_hour))
        .with_file_path(format!("raw/{:03}.grib2", forecast_hour))
        .with_converted_file_path(converted_path(forecast_hour))
}

/// Locator of the converted payload for a forecast hour.
pub fn converted_path(forecast_hour: i64) -> String {
    format!("converted/{:03}.json", forecast_hour)
}
