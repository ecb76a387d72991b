//! Query normalization.
//!
//! Turns a raw client query into the canonical form understood by the storage
//! layer plus the request-scoped parameters that must never reach it. Values
//! that cannot be coerced are left as they are; the storage layer rejects them.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use forecast_common::{parse_instant, ForecastResult, ResampleParams};

use crate::resolver::{nearest_forecast_range, nearest_forecast_time};
use crate::value::{
    ComparisonOp, GeometryFilter, Query, QueryValue, GEOMETRY_FIELD, OPERATOR_PREFIX,
};

/// Instant-typed record fields.
pub const TIME_FIELDS: [&str; 2] = ["runTime", "forecastTime"];

/// Resampling fields, in `origin`, `step`, `dest_size` order.
pub const RESAMPLE_FIELDS: [&str; 6] = ["oLon", "oLat", "sLon", "sLat", "dLon", "dLat"];

/// Proximity shortcut fields.
pub const PROXIMITY_FIELDS: [&str; 3] = ["centerLon", "centerLat", "distance"];

/// Locator the materializer needs from externally stored items.
pub const CONVERTED_FILE_PATH: &str = "convertedFilePath";

const PAGINATE_FIELD: &str = "$paginate";

/// What normalization needs to know about the target forecast element.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Forecast times available in the element's catalog
    pub forecast_times: &'a [DateTime<Utc>],
    /// Payloads live in an external byte store
    pub external_storage: bool,
    /// The query targets raster tiles
    pub tile_query: bool,
}

/// Request-scoped parameters extracted from the query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RequestParams {
    /// `Some(false)` disables pagination for this request
    pub paginate: Option<bool>,
    pub resample: Option<ResampleParams>,
}

/// Run every normalization step on a raw JSON query.
pub fn normalize_query(
    raw: Value,
    ctx: &NormalizeContext<'_>,
) -> ForecastResult<(Query, RequestParams)> {
    let mut query = Query::from_json(raw)?;
    let mut params = RequestParams::default();

    coerce_comparisons(&mut query);
    marshall_times(&mut query, ctx.forecast_times)?;
    marshall_geometry(&mut query);
    rewrite_proximity(&mut query);
    params.resample = extract_resampling(&mut query);
    if ctx.tile_query {
        apply_tile_default(&mut query);
    }
    params.paginate = apply_pagination_override(&mut query);
    if ctx.external_storage {
        select_converted_file_path(&mut query);
    }

    debug!(
        fields = query.fields.len(),
        resample = params.resample.is_some(),
        paginate = ?params.paginate,
        "Normalized query"
    );
    Ok((query, params))
}

/// Coerce text values of `$lt/$lte/$gt/$gte` operators to numbers, or failing
/// that to instants, anywhere in the query.
pub fn coerce_comparisons(query: &mut Query) {
    for value in query.fields.values_mut() {
        coerce_comparisons_in(value);
    }
}

fn coerce_comparisons_in(value: &mut QueryValue) {
    match value {
        QueryValue::Comparison(ops) => {
            for operand in ops.values_mut() {
                coerce_comparable(operand);
                coerce_comparisons_in(operand);
            }
        }
        QueryValue::Nested(map) => {
            for (key, child) in map.iter_mut() {
                if ComparisonOp::from_key(key).is_some() {
                    coerce_comparable(child);
                }
                coerce_comparisons_in(child);
            }
        }
        QueryValue::List(items) => items.iter_mut().for_each(coerce_comparisons_in),
        QueryValue::Geometry(GeometryFilter::Spatial { params, .. }) => {
            params.values_mut().for_each(coerce_comparisons_in)
        }
        _ => {}
    }
}

fn coerce_comparable(value: &mut QueryValue) {
    let QueryValue::Text(text) = value else {
        return;
    };
    if let Some(number) = parse_number(text) {
        *value = QueryValue::Number(number);
    } else if let Ok(instant) = parse_instant(text) {
        *value = QueryValue::Instant(instant);
    }
}

/// Convert `runTime`/`forecastTime` text to instants and rewrite the `time`
/// and `from`/`to` convenience fields to stored forecast times.
///
/// Fails only when a rewrite is needed and the catalog is empty.
pub fn marshall_times(query: &mut Query, forecast_times: &[DateTime<Utc>]) -> ForecastResult<()> {
    for field in TIME_FIELDS {
        if let Some(value) = query.fields.get_mut(field) {
            marshall_instants(value);
        }
    }

    if query.contains("time") {
        match query.get("time").and_then(instant_of) {
            Some(instant) => {
                let nearest = nearest_forecast_time(instant, forecast_times)?;
                query.remove("time");
                query.insert("forecastTime", QueryValue::Instant(nearest));
            }
            None => warn!(value = ?query.get("time"), "Cannot parse requested time"),
        }
    }

    if query.contains("from") && query.contains("to") {
        let from = query.get("from").and_then(instant_of);
        let to = query.get("to").and_then(instant_of);
        match (from, to) {
            (Some(from), Some(to)) => {
                let (start, end) = nearest_forecast_range(from, to, forecast_times)?;
                query.remove("from");
                query.remove("to");
                let mut range = BTreeMap::new();
                range.insert(ComparisonOp::Gte, QueryValue::Instant(start));
                range.insert(ComparisonOp::Lte, QueryValue::Instant(end));
                query.insert("forecastTime", QueryValue::Comparison(range));
            }
            _ => warn!("Cannot parse requested time range"),
        }
    }

    Ok(())
}

fn marshall_instants(value: &mut QueryValue) {
    match value {
        QueryValue::Text(text) => {
            if let Ok(instant) = parse_instant(text) {
                *value = QueryValue::Instant(instant);
            }
        }
        QueryValue::List(items) => items.iter_mut().for_each(marshall_instants),
        QueryValue::Comparison(ops) => ops.values_mut().for_each(marshall_instants),
        QueryValue::Nested(map) => map.values_mut().for_each(marshall_instants),
        _ => {}
    }
}

fn instant_of(value: &QueryValue) -> Option<DateTime<Utc>> {
    match value {
        QueryValue::Instant(instant) => Some(*instant),
        QueryValue::Text(text) => parse_instant(text).ok(),
        _ => None,
    }
}

/// Coerce text parameters of a spatial operator to numbers, and canonicalize
/// a numeric `$near` point predicate.
pub fn marshall_geometry(query: &mut Query) {
    let near = match query.fields.get_mut(GEOMETRY_FIELD) {
        Some(QueryValue::Geometry(GeometryFilter::Spatial { operator, params })) => {
            for (key, param) in params.iter_mut() {
                if !key.starts_with(OPERATOR_PREFIX) {
                    continue;
                }
                match param {
                    QueryValue::Nested(map) => {
                        if let Some(coordinates) = map.get_mut("coordinates") {
                            coerce_coordinates(coordinates);
                        }
                    }
                    QueryValue::Text(text) => {
                        if let Some(number) = parse_number(text) {
                            *param = QueryValue::Number(number);
                        }
                    }
                    _ => {}
                }
            }
            if operator == "$near" {
                near_point(params)
            } else {
                None
            }
        }
        _ => None,
    };

    if let Some((center, max_distance)) = near {
        query.insert(
            GEOMETRY_FIELD,
            QueryValue::Geometry(GeometryFilter::Near {
                center,
                max_distance,
            }),
        );
    }
}

fn coerce_coordinates(value: &mut QueryValue) {
    match value {
        QueryValue::List(items) => items.iter_mut().for_each(coerce_coordinates),
        QueryValue::Text(text) => {
            if let Some(number) = parse_number(text) {
                *value = QueryValue::Number(number);
            }
        }
        _ => {}
    }
}

/// `{$geometry: {type: Point, coordinates: [lon, lat]}, $maxDistance: d}`
fn near_point(params: &BTreeMap<String, QueryValue>) -> Option<([f64; 2], f64)> {
    if params.len() != 2 {
        return None;
    }
    let max_distance = params.get("$maxDistance")?.as_f64()?;
    let QueryValue::Nested(point) = params.get("$geometry")? else {
        return None;
    };
    if point.len() != 2 || point.get("type")?.as_text()? != "Point" {
        return None;
    }
    match point.get("coordinates")? {
        QueryValue::List(coordinates) => match coordinates.as_slice() {
            [lon, lat] => Some(([lon.as_f64()?, lat.as_f64()?], max_distance)),
            _ => None,
        },
        _ => None,
    }
}

/// Rewrite `centerLon`/`centerLat`/`distance` to a near-point geometry.
pub fn rewrite_proximity(query: &mut Query) {
    if !PROXIMITY_FIELDS.iter().all(|f| query.contains(f)) {
        return;
    }

    let values: Option<Vec<f64>> = PROXIMITY_FIELDS
        .iter()
        .map(|f| query.get(f).and_then(numeric_value))
        .collect();
    let Some(values) = values else {
        warn!("Proximity parameters are not numeric, leaving them in the query");
        return;
    };

    for field in PROXIMITY_FIELDS {
        query.remove(field);
    }
    query.insert(
        GEOMETRY_FIELD,
        QueryValue::Geometry(GeometryFilter::Near {
            center: [values[0], values[1]],
            max_distance: values[2],
        }),
    );
}

/// Move the six resampling fields out of the query.
///
/// The output size must be a whole number of cells, at least one per axis,
/// and the raster at most `MAX_RESAMPLE_CELLS` cells.
pub fn extract_resampling(query: &mut Query) -> Option<ResampleParams> {
    if !RESAMPLE_FIELDS.iter().all(|f| query.contains(f)) {
        return None;
    }

    let values: Option<Vec<f64>> = RESAMPLE_FIELDS
        .iter()
        .map(|f| query.get(f).and_then(numeric_value))
        .collect();
    let Some(values) = values else {
        warn!("Resampling parameters are not numeric, leaving them in the query");
        return None;
    };

    let dest_size = [axis_cells(values[4])?, axis_cells(values[5])?];
    if ResampleParams::cell_count(dest_size).is_none() {
        warn!(
            cols = dest_size[0],
            rows = dest_size[1],
            "Resampling size exceeds the cell limit, leaving it in the query"
        );
        return None;
    }

    for field in RESAMPLE_FIELDS {
        query.remove(field);
    }
    Some(ResampleParams::new(
        [values[0], values[1]],
        [values[2], values[3]],
        dest_size,
    ))
}

fn axis_cells(value: f64) -> Option<usize> {
    if value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as usize)
    } else {
        warn!(value, "Resampling size must be a positive whole number");
        None
    }
}

/// Tile queries without geometry only target raw, ungeometried records.
pub fn apply_tile_default(query: &mut Query) {
    if !query.contains(GEOMETRY_FIELD) {
        query.insert(
            GEOMETRY_FIELD,
            QueryValue::Geometry(GeometryFilter::Exists(false)),
        );
    }
}

/// Remove a `$paginate: false` override, returning it.
pub fn apply_pagination_override(query: &mut Query) -> Option<bool> {
    let disabled = matches!(
        query.get(PAGINATE_FIELD),
        Some(QueryValue::Bool(false))
    ) || query.get(PAGINATE_FIELD).and_then(QueryValue::as_text) == Some("false");

    if disabled {
        query.remove(PAGINATE_FIELD);
        Some(false)
    } else {
        None
    }
}

/// Make sure a field selection keeps the payload locator.
pub fn select_converted_file_path(query: &mut Query) {
    if let Some(select) = query.select.as_mut() {
        if !select.iter().any(|f| f == CONVERTED_FILE_PATH) {
            select.push(CONVERTED_FILE_PATH.to_string());
        }
    }
}

fn numeric_value(value: &QueryValue) -> Option<f64> {
    match value {
        QueryValue::Number(n) if n.is_finite() => Some(*n),
        QueryValue::Text(text) => parse_number(text),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_utils::time::{hours, three_hourly};

    fn query(value: Value) -> Query {
        Query::from_json(value).unwrap()
    }

    #[test]
    fn test_comparison_coercion() {
        let mut q = query(json!({
            "level": {"$gte": "850", "$lt": "garbage"},
            "forecastTime": {"$gt": "2024-01-01T03:00:00Z"},
            "$or": [{"value": {"$lte": "1.5"}}],
        }));
        coerce_comparisons(&mut q);

        assert_eq!(
            q.to_json(),
            json!({
                "level": {"$gte": 850, "$lt": "garbage"},
                "forecastTime": {"$gt": "2024-01-01T03:00:00Z"},
                "$or": [{"value": {"$lte": 1.5}}],
            })
        );
        let Some(QueryValue::Comparison(ops)) = q.get("forecastTime") else {
            panic!("expected comparison");
        };
        assert_eq!(ops[&ComparisonOp::Gt], QueryValue::Instant(hours(3)));
    }

    #[test]
    fn test_comparison_coercion_inside_mixed_operators() {
        let mut q = query(json!({"level": {"$gte": "10", "$ne": "20"}}));
        coerce_comparisons(&mut q);
        assert_eq!(q.to_json(), json!({"level": {"$gte": 10, "$ne": "20"}}));
    }

    #[test]
    fn test_marshall_time_fields() {
        let mut q = query(json!({
            "runTime": "2024-01-01T00:00:00Z",
            "forecastTime": {"$in": ["2024-01-01T03:00:00Z", "not a time"]},
        }));
        marshall_times(&mut q, &three_hourly()).unwrap();

        assert_eq!(q.get("runTime"), Some(&QueryValue::Instant(hours(0))));
        let Some(QueryValue::Nested(ops)) = q.get("forecastTime") else {
            panic!("expected nested operators");
        };
        assert_eq!(
            ops["$in"],
            QueryValue::List(vec![
                QueryValue::Instant(hours(3)),
                QueryValue::Text("not a time".into())
            ])
        );
    }

    #[test]
    fn test_time_rewrites_to_nearest_forecast_time() {
        let mut q = query(json!({"time": "2024-01-01T04:10:00Z"}));
        marshall_times(&mut q, &three_hourly()).unwrap();

        assert!(!q.contains("time"));
        assert_eq!(q.get("forecastTime"), Some(&QueryValue::Instant(hours(3))));
    }

    #[test]
    fn test_time_rewrite_with_empty_catalog_fails() {
        let mut q = query(json!({"time": "2024-01-01T04:10:00Z"}));
        assert!(marshall_times(&mut q, &[]).is_err());
    }

    #[test]
    fn test_unparseable_time_is_left_alone() {
        let mut q = query(json!({"time": "soon"}));
        marshall_times(&mut q, &three_hourly()).unwrap();
        assert_eq!(q.get("time"), Some(&QueryValue::Text("soon".into())));
        assert!(!q.contains("forecastTime"));
    }

    #[test]
    fn test_geometry_text_parameters_coerced() {
        let mut q = query(json!({
            "geometry": {
                "$geoWithin": {
                    "$geometry": {
                        "type": "Polygon",
                        "coordinates": [[["0", "0"], ["10", "0"], ["10", "10"], ["0", "0"]]]
                    },
                    "$radius": "3.5"
                }
            }
        }));
        marshall_geometry(&mut q);

        assert_eq!(
            q.to_json()["geometry"],
            json!({
                "$geoWithin": {
                    "$geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 0]]]
                    },
                    "$radius": 3.5
                }
            })
        );
    }

    #[test]
    fn test_near_operator_is_canonicalized() {
        let mut q = query(json!({
            "geometry": {
                "$near": {
                    "$geometry": {"type": "Point", "coordinates": ["2.35", "48.85"]},
                    "$maxDistance": "1000"
                }
            }
        }));
        marshall_geometry(&mut q);

        assert_eq!(
            q.get("geometry"),
            Some(&QueryValue::Geometry(GeometryFilter::Near {
                center: [2.35, 48.85],
                max_distance: 1000.0,
            }))
        );
    }

    #[test]
    fn test_malformed_resampling_is_left_in_query() {
        let mut q = query(json!({
            "oLon": "-10", "oLat": 60, "sLon": 0.5, "sLat": 0.5, "dLon": "2.5", "dLat": 10
        }));
        assert_eq!(extract_resampling(&mut q), None);
        assert!(q.contains("dLon"));

        let mut q = query(json!({"oLon": -10, "oLat": 60}));
        assert_eq!(extract_resampling(&mut q), None);
        assert!(q.contains("oLon"));
    }

    #[test]
    fn test_tile_default_keeps_existing_geometry() {
        let mut q = query(json!({"geometry": {"$exists": true}}));
        apply_tile_default(&mut q);
        assert_eq!(
            q.get("geometry"),
            Some(&QueryValue::Geometry(GeometryFilter::Exists(true)))
        );

        let mut q = query(json!({}));
        apply_tile_default(&mut q);
        assert_eq!(
            q.get("geometry"),
            Some(&QueryValue::Geometry(GeometryFilter::Exists(false)))
        );
    }

    #[test]
    fn test_pagination_override() {
        let mut q = query(json!({"$paginate": "false"}));
        assert_eq!(apply_pagination_override(&mut q), Some(false));
        assert!(!q.contains("$paginate"));

        let mut q = query(json!({"$paginate": false}));
        assert_eq!(apply_pagination_override(&mut q), Some(false));

        let mut q = query(json!({"$paginate": "true"}));
        assert_eq!(apply_pagination_override(&mut q), None);
        assert!(q.contains("$paginate"));
    }

    #[test]
    fn test_select_keeps_locator_once() {
        let mut q = query(json!({"$select": ["data", "convertedFilePath"]}));
        select_converted_file_path(&mut q);
        assert_eq!(
            q.select,
            Some(vec!["data".to_string(), "convertedFilePath".to_string()])
        );

        let mut q = query(json!({}));
        select_converted_file_path(&mut q);
        assert_eq!(q.select, None);
    }
}
