//! The storage query layer seam and an in-memory implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use forecast_common::{parse_instant, ForecastError, ForecastItem, ForecastResult};
use forecast_query::{ComparisonOp, GeometryFilter, Query, QueryValue};

use crate::config::PaginateConfig;

/// Mean Earth radius used for proximity predicates, in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Window of records to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    /// `None` returns every match
    pub limit: Option<usize>,
    pub skip: usize,
}

impl Pagination {
    pub fn unpaginated() -> Self {
        Self::default()
    }

    /// Take `$limit`/`$skip` out of a normalized query.
    ///
    /// The page size is capped by `config.max` unless pagination was turned
    /// off for the request.
    pub fn take_from(query: &mut Query, config: &PaginateConfig, paginate: Option<bool>) -> Self {
        let requested = take_count(query, "$limit");
        let skip = take_count(query, "$skip").unwrap_or(0);

        let limit = match paginate {
            Some(false) => None,
            _ => Some(requested.unwrap_or(config.default).min(config.max)),
        };
        Self { limit, skip }
    }
}

fn take_count(query: &mut Query, field: &str) -> Option<usize> {
    let count = match query.get(field)? {
        QueryValue::Number(n) if *n >= 0.0 => Some(*n as usize),
        QueryValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    };
    query.remove(field);
    count
}

/// Storage query layer: returns the item records matching a canonical query.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find(
        &self,
        query: &Query,
        pagination: Pagination,
    ) -> ForecastResult<Vec<ForecastItem>>;
}

/// Item records held in memory.
///
/// Supports equality, `$lt/$lte/$gt/$gte`, `$in`, `$nin`, `$ne`, `$exists`
/// and near-point geometry predicates. Operand types are checked the way a
/// database would: a comparison against raw text is rejected.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: Vec<ForecastItem>,
}

impl MemoryItemStore {
    pub fn new(items: Vec<ForecastItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn find(
        &self,
        query: &Query,
        pagination: Pagination,
    ) -> ForecastResult<Vec<ForecastItem>> {
        let mut matched = Vec::new();

        for item in &self.items {
            let record = serde_json::to_value(item)?;
            if matches_query(query, &record)? {
                matched.push(item.clone());
            }
        }

        let total = matched.len();
        let page: Vec<ForecastItem> = matched
            .into_iter()
            .skip(pagination.skip)
            .take(pagination.limit.unwrap_or(usize::MAX))
            .collect();

        debug!(total, returned = page.len(), "Matched items");
        Ok(page)
    }
}

fn matches_query(query: &Query, record: &Value) -> ForecastResult<bool> {
    for (field, predicate) in &query.fields {
        // Remaining `$` fields are query options, not predicates
        if field.starts_with('$') {
            continue;
        }
        if !matches_value(predicate, record.get(field))? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_value(predicate: &QueryValue, actual: Option<&Value>) -> ForecastResult<bool> {
    let actual = actual.filter(|v| !v.is_null());

    match predicate {
        QueryValue::Geometry(GeometryFilter::Exists(exists)) => Ok(actual.is_some() == *exists),
        QueryValue::Geometry(GeometryFilter::Near {
            center,
            max_distance,
        }) => Ok(actual
            .and_then(point_of)
            .map_or(false, |point| haversine_distance(*center, point) <= *max_distance)),
        QueryValue::Geometry(GeometryFilter::Spatial { operator, .. }) => Err(
            ForecastError::InvalidQuery(format!("unsupported spatial operator {}", operator)),
        ),
        QueryValue::Comparison(ops) => {
            for (op, operand) in ops {
                if !compare(*op, operand, actual)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        QueryValue::Nested(map) if map.keys().any(|k| k.starts_with('$')) => {
            matches_operators(map, actual)
        }
        _ => Ok(equals(predicate, actual)),
    }
}

fn matches_operators(
    operators: &BTreeMap<String, QueryValue>,
    actual: Option<&Value>,
) -> ForecastResult<bool> {
    for (key, operand) in operators {
        let matched = match key.as_str() {
            "$ne" => !equals(operand, actual),
            "$in" => list_operand(key, operand)?.iter().any(|v| equals(v, actual)),
            "$nin" => !list_operand(key, operand)?.iter().any(|v| equals(v, actual)),
            "$exists" => match operand {
                QueryValue::Bool(exists) => actual.is_some() == *exists,
                _ => return Err(invalid_operand(key, operand)),
            },
            other => match ComparisonOp::from_key(other) {
                Some(op) => compare(op, operand, actual)?,
                None => {
                    return Err(ForecastError::InvalidQuery(format!(
                        "unsupported operator {}",
                        other
                    )))
                }
            },
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list_operand<'a>(key: &str, operand: &'a QueryValue) -> ForecastResult<&'a [QueryValue]> {
    match operand {
        QueryValue::List(items) => Ok(items),
        _ => Err(invalid_operand(key, operand)),
    }
}

fn compare(
    op: ComparisonOp,
    operand: &QueryValue,
    actual: Option<&Value>,
) -> ForecastResult<bool> {
    let ordering = match (operand, actual) {
        (QueryValue::Number(expected), Some(value)) => {
            value.as_f64().and_then(|v| v.partial_cmp(expected))
        }
        (QueryValue::Instant(expected), Some(Value::String(text))) => {
            parse_instant(text).ok().map(|v| v.cmp(expected))
        }
        (QueryValue::Number(_) | QueryValue::Instant(_), _) => None,
        _ => return Err(invalid_operand(op.as_key(), operand)),
    };

    Ok(match ordering {
        Some(ordering) => match op {
            ComparisonOp::Lt => ordering.is_lt(),
            ComparisonOp::Lte => ordering.is_le(),
            ComparisonOp::Gt => ordering.is_gt(),
            ComparisonOp::Gte => ordering.is_ge(),
        },
        None => false,
    })
}

fn equals(expected: &QueryValue, actual: Option<&Value>) -> bool {
    match (expected, actual) {
        (QueryValue::Null, None) => true,
        (_, None) => false,
        (QueryValue::Number(n), Some(value)) => value.as_f64() == Some(*n),
        (QueryValue::Instant(instant), Some(Value::String(text))) => {
            parse_instant(text).map_or(false, |v| v == *instant)
        }
        (expected, Some(value)) => expected.to_json() == *value,
    }
}

fn invalid_operand(key: &str, operand: &QueryValue) -> ForecastError {
    ForecastError::InvalidQuery(format!("invalid operand for {}: {}", key, operand.to_json()))
}

/// (lon, lat) of a GeoJSON point.
fn point_of(geometry: &Value) -> Option<[f64; 2]> {
    if geometry.get("type")?.as_str()? != "Point" {
        return None;
    }
    let coordinates = geometry.get("coordinates")?.as_array()?;
    Some([coordinates.first()?.as_f64()?, coordinates.get(1)?.as_f64()?])
}

/// Great-circle distance in meters between two (lon, lat) points.
fn haversine_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lat1, lat2) = (a[1].to_radians(), b[1].to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b[0] - a[0]).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
