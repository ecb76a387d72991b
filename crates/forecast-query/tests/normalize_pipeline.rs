//! End-to-end query normalization.

use chrono::{DateTime, Utc};
use forecast_common::{ForecastError, ResampleParams};
use forecast_query::{normalize_query, GeometryFilter, NormalizeContext, QueryValue};
use serde_json::json;
use test_utils::time::{hours, three_hourly};

fn context(times: &[DateTime<Utc>]) -> NormalizeContext<'_> {
    NormalizeContext {
        forecast_times: times,
        external_storage: true,
        tile_query: false,
    }
}

#[test]
fn test_proximity_rewrite() {
    let times = three_hourly();
    let (query, _) = normalize_query(
        json!({"centerLon": 10, "centerLat": 20, "distance": 500}),
        &context(&times),
    )
    .unwrap();

    assert!(!query.contains("centerLon"));
    assert!(!query.contains("centerLat"));
    assert!(!query.contains("distance"));
    assert_eq!(
        query.get("geometry"),
        Some(&QueryValue::Geometry(GeometryFilter::Near {
            center: [10.0, 20.0],
            max_distance: 500.0,
        }))
    );
    assert_eq!(
        query.to_json(),
        json!({
            "geometry": {
                "$near": {
                    "$geometry": {"type": "Point", "coordinates": [10, 20]},
                    "$maxDistance": 500
                }
            }
        })
    );
}

#[test]
fn test_proximity_rewrite_from_query_strings() {
    let times = three_hourly();
    let (query, _) = normalize_query(
        json!({"centerLon": "10.5", "centerLat": "-20", "distance": "2500"}),
        &context(&times),
    )
    .unwrap();

    assert_eq!(
        query.get("geometry"),
        Some(&QueryValue::Geometry(GeometryFilter::Near {
            center: [10.5, -20.0],
            max_distance: 2500.0,
        }))
    );
}

#[test]
fn test_range_rewrite() {
    let times = three_hourly();
    let (query, _) = normalize_query(
        json!({"from": "2024-01-01T00:00Z", "to": "2024-01-01T06:00Z"}),
        &context(&times),
    )
    .unwrap();

    assert!(!query.contains("from"));
    assert!(!query.contains("to"));
    assert_eq!(
        query.to_json(),
        json!({
            "forecastTime": {
                "$gte": "2024-01-01T00:00:00Z",
                "$lte": "2024-01-01T06:00:00Z"
            }
        })
    );
}

#[test]
fn test_range_rewrite_snaps_to_stored_times() {
    let times = three_hourly();
    let (query, _) = normalize_query(
        json!({"from": "2024-01-01T01:00:00Z", "to": "2024-01-01T07:40:00Z"}),
        &context(&times),
    )
    .unwrap();

    assert_eq!(
        query.to_json()["forecastTime"],
        json!({"$gte": "2024-01-01T00:00:00Z", "$lte": "2024-01-01T09:00:00Z"})
    );
}

#[test]
fn test_time_rewrite_tie_break() {
    let times = vec![hours(2), hours(4)];
    let (query, _) =
        normalize_query(json!({"time": "2024-01-01T03:00:00Z"}), &context(&times)).unwrap();
    assert_eq!(query.get("forecastTime"), Some(&QueryValue::Instant(hours(2))));
}

#[test]
fn test_empty_catalog_is_a_hard_error() {
    let err = normalize_query(json!({"time": "2024-01-01T03:00:00Z"}), &context(&[]))
        .unwrap_err();
    assert!(matches!(err, ForecastError::NoForecastAvailable(_)));
    assert_eq!(err.error_class(), "no-forecast");

    let err = normalize_query(
        json!({"from": "2024-01-01T00:00Z", "to": "2024-01-01T06:00Z"}),
        &context(&[]),
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::NoForecastAvailable(_)));

    // Nothing to resolve, nothing to fail
    assert!(normalize_query(json!({"level": 850}), &context(&[])).is_ok());
}

#[test]
fn test_resampling_parameters_leave_the_query() {
    let times = three_hourly();
    let (query, params) = normalize_query(
        json!({
            "forecastTime": "2024-01-01T03:00:00Z",
            "oLon": "-10", "oLat": "60",
            "sLon": "0.5", "sLat": 0.5,
            "dLon": "80", "dLat": 50,
            "$select": ["forecastTime", "data"]
        }),
        &context(&times),
    )
    .unwrap();

    assert_eq!(
        params.resample,
        Some(ResampleParams::new([-10.0, 60.0], [0.5, 0.5], [80, 50]))
    );
    assert_eq!(
        query.to_json(),
        json!({
            "forecastTime": "2024-01-01T03:00:00Z",
            "$select": ["forecastTime", "data", "convertedFilePath"]
        })
    );
}

#[test]
fn test_oversized_resampling_stays_in_the_query() {
    let times = three_hourly();
    let max = u32::MAX as u64;
    let (query, params) = normalize_query(
        json!({"oLon": 0, "oLat": 0, "sLon": 1, "sLat": 1, "dLon": max, "dLat": max}),
        &context(&times),
    )
    .unwrap();

    assert!(params.resample.is_none());
    assert!(query.contains("dLon"));
    assert!(query.contains("oLat"));

    let (_, params) = normalize_query(
        json!({"oLon": 0, "oLat": 0, "sLon": 1, "sLat": 1, "dLon": 4096, "dLat": 4096}),
        &context(&times),
    )
    .unwrap();
    assert_eq!(params.resample.unwrap().dest_size, [4096, 4096]);
}

#[test]
fn test_tile_query_defaults_to_raw_records() {
    let times = three_hourly();
    let ctx = NormalizeContext {
        forecast_times: &times,
        external_storage: false,
        tile_query: true,
    };
    let (query, params) = normalize_query(
        json!({"forecastTime": "2024-01-01T03:00:00Z", "$paginate": "false", "$select": ["data"]}),
        &ctx,
    )
    .unwrap();

    assert_eq!(params.paginate, Some(false));
    assert_eq!(
        query.to_json(),
        json!({
            "forecastTime": "2024-01-01T03:00:00Z",
            "geometry": {"$exists": false},
            "$select": ["data"]
        })
    );
}

#[test]
fn test_proximity_overrides_tile_default() {
    let times = three_hourly();
    let ctx = NormalizeContext {
        forecast_times: &times,
        external_storage: true,
        tile_query: true,
    };
    let (query, _) = normalize_query(
        json!({"centerLon": 1, "centerLat": 2, "distance": 3}),
        &ctx,
    )
    .unwrap();

    assert!(matches!(
        query.get("geometry"),
        Some(QueryValue::Geometry(GeometryFilter::Near { .. }))
    ));
}
