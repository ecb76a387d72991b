//! Error types for forecast grid services.

use thiserror::Error;

/// Result type alias using ForecastError.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Primary error type for grid, query and materialization operations.
#[derive(Debug, Error)]
pub enum ForecastError {
    // === Grid Errors ===
    #[error("Grid index ({col}, {row}) outside grid of {columns}x{rows} cells")]
    OutOfRange {
        col: usize,
        row: usize,
        columns: usize,
        rows: usize,
    },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    // === Query Errors ===
    #[error("No forecast available: {0}")]
    NoForecastAvailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // === Data Errors ===
    #[error("Cannot read converted {forecast}/{element} forecast at {forecast_time} for run {run_time}: {reason}")]
    DataUnavailable {
        forecast: String,
        element: String,
        forecast_time: String,
        run_time: String,
        reason: String,
    },

    // === Storage Errors ===
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    GeneralConfiguration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForecastError {
    /// Client-facing error class.
    ///
    /// Distinguishes "no matching forecast time" from "data temporarily
    /// unreadable" from "invalid query".
    pub fn error_class(&self) -> &'static str {
        match self {
            ForecastError::NoForecastAvailable(_) => "no-forecast",
            ForecastError::DataUnavailable { .. }
            | ForecastError::NotFound(_)
            | ForecastError::Storage(_) => "data-unavailable",
            ForecastError::InvalidQuery(_) | ForecastError::InvalidCoordinate(_) => {
                "invalid-query"
            }
            ForecastError::GeneralConfiguration(_) => "configuration",
            _ => "internal",
        }
    }

    /// Get the HTTP status code a transport layer should use for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ForecastError::InvalidQuery(_) | ForecastError::InvalidCoordinate(_) => 400,

            ForecastError::NoForecastAvailable(_) | ForecastError::NotFound(_) => 404,

            ForecastError::DataUnavailable { .. } | ForecastError::Storage(_) => 503,

            _ => 500,
        }
    }

    /// Build a DataUnavailable error carrying the item identity.
    pub fn data_unavailable(
        forecast: impl Into<String>,
        element: impl Into<String>,
        forecast_time: impl Into<String>,
        run_time: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DataUnavailable {
            forecast: forecast.into(),
            element: element.into(),
            forecast_time: forecast_time.into(),
            run_time: run_time.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ForecastError::NotFound(err.to_string()),
            _ => ForecastError::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes_are_distinct() {
        let no_forecast = ForecastError::NoForecastAvailable("empty catalog".into());
        let unreadable =
            ForecastError::data_unavailable("arpege", "temperature", "t", "r", "missing");
        let invalid = ForecastError::InvalidQuery("bad".into());

        assert_eq!(no_forecast.error_class(), "no-forecast");
        assert_eq!(unreadable.error_class(), "data-unavailable");
        assert_eq!(invalid.error_class(), "invalid-query");
        assert_eq!(no_forecast.http_status_code(), 404);
        assert_eq!(unreadable.http_status_code(), 503);
        assert_eq!(invalid.http_status_code(), 400);
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: ForecastError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(matches!(err, ForecastError::NotFound(_)));

        let err: ForecastError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, ForecastError::Storage(_)));
    }

    #[test]
    fn test_data_unavailable_message_has_item_identity() {
        let err = ForecastError::data_unavailable(
            "arpege-world",
            "temperature",
            "2024-01-01T03:00:00Z",
            "2024-01-01T00:00:00Z",
            "corrupted payload",
        );
        let msg = err.to_string();
        assert!(msg.contains("arpege-world/temperature"));
        assert!(msg.contains("2024-01-01T03:00:00Z"));
        assert!(msg.contains("for run 2024-01-01T00:00:00Z"));
    }
}
