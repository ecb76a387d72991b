//! Tagged representation of client query trees.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use forecast_common::{format_instant, ForecastError, ForecastResult};

/// Reserved prefix of query operators.
pub const OPERATOR_PREFIX: char = '$';

/// Field holding the geometry predicate.
pub const GEOMETRY_FIELD: &str = "geometry";

/// Field holding the client's field selection.
pub const SELECT_FIELD: &str = "$select";

/// Ordering operators whose values must be numbers or instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComparisonOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            _ => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
        }
    }
}

/// Geometry predicate of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryFilter {
    /// `{$exists: bool}`; `Exists(false)` selects raw, ungeometried records
    Exists(bool),
    /// Records within `max_distance` of the (lon, lat) `center`
    Near { center: [f64; 2], max_distance: f64 },
    /// Any other spatial operator with its `$`-parameters
    Spatial {
        operator: String,
        params: BTreeMap<String, QueryValue>,
    },
}

/// A node of a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Instant(DateTime<Utc>),
    List(Vec<QueryValue>),
    Comparison(BTreeMap<ComparisonOp, QueryValue>),
    Geometry(GeometryFilter),
    Nested(BTreeMap<String, QueryValue>),
}

impl QueryValue {
    /// Parse a JSON value.
    ///
    /// Non-empty objects whose keys are all comparison operators become
    /// [`QueryValue::Comparison`], other objects [`QueryValue::Nested`].
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                let all_comparisons =
                    !map.is_empty() && map.keys().all(|k| ComparisonOp::from_key(k).is_some());
                if all_comparisons {
                    Self::Comparison(
                        map.into_iter()
                            .filter_map(|(k, v)| {
                                ComparisonOp::from_key(&k).map(|op| (op, Self::from_json(v)))
                            })
                            .collect(),
                    )
                } else {
                    Self::Nested(
                        map.into_iter()
                            .map(|(k, v)| (k, Self::from_json(v)))
                            .collect(),
                    )
                }
            }
        }
    }

    /// Render the canonical JSON form; instants become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Text(s) => Value::String(s.clone()),
            Self::Instant(dt) => Value::String(format_instant(dt)),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Comparison(ops) => Value::Object(
                ops.iter()
                    .map(|(op, v)| (op.as_key().to_string(), v.to_json()))
                    .collect(),
            ),
            Self::Geometry(filter) => filter.to_json(),
            Self::Nested(map) => Value::Object(map_to_json(map)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl GeometryFilter {
    /// Parse the value of the `geometry` field.
    ///
    /// Only single-operator objects are geometry predicates; a literal
    /// geometry stays a plain value.
    pub fn from_json(value: Value) -> QueryValue {
        let map = match value {
            Value::Object(map) => map,
            other => return QueryValue::from_json(other),
        };
        if map.len() != 1 {
            return QueryValue::from_json(Value::Object(map));
        }

        let Some((operator, params)) = map.into_iter().next() else {
            return QueryValue::Nested(BTreeMap::new());
        };

        match (operator.as_str(), params) {
            ("$exists", Value::Bool(exists)) => QueryValue::Geometry(Self::Exists(exists)),
            (op, Value::Object(params)) if op.starts_with(OPERATOR_PREFIX) => {
                QueryValue::Geometry(Self::Spatial {
                    operator,
                    params: params
                        .into_iter()
                        .map(|(k, v)| (k, QueryValue::from_json(v)))
                        .collect(),
                })
            }
            (_, params) => {
                let mut nested = BTreeMap::new();
                nested.insert(operator, QueryValue::from_json(params));
                QueryValue::Nested(nested)
            }
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::Exists(exists) => {
                map.insert("$exists".to_string(), Value::Bool(*exists));
            }
            Self::Near {
                center,
                max_distance,
            } => {
                let mut point = Map::new();
                point.insert("type".to_string(), Value::String("Point".to_string()));
                point.insert(
                    "coordinates".to_string(),
                    Value::Array(vec![number_to_json(center[0]), number_to_json(center[1])]),
                );
                let mut near = Map::new();
                near.insert("$geometry".to_string(), Value::Object(point));
                near.insert("$maxDistance".to_string(), number_to_json(*max_distance));
                map.insert("$near".to_string(), Value::Object(near));
            }
            Self::Spatial { operator, params } => {
                map.insert(operator.clone(), Value::Object(map_to_json(params)));
            }
        }
        Value::Object(map)
    }
}

/// A client query: field predicates plus an optional field selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub fields: BTreeMap<String, QueryValue>,
    pub select: Option<Vec<String>>,
}

impl Query {
    /// Parse a raw JSON query object.
    pub fn from_json(value: Value) -> ForecastResult<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(ForecastError::InvalidQuery(format!(
                    "query must be an object, got {}",
                    other
                )))
            }
        };

        let mut query = Query::default();
        for (key, value) in map {
            match key.as_str() {
                SELECT_FIELD => query.select = parse_select(value),
                GEOMETRY_FIELD => {
                    query.fields.insert(key, GeometryFilter::from_json(value));
                }
                _ => {
                    query.fields.insert(key, QueryValue::from_json(value));
                }
            }
        }
        Ok(query)
    }

    /// Render the canonical form handed to the storage layer.
    pub fn to_json(&self) -> Value {
        let mut map = map_to_json(&self.fields);
        if let Some(select) = &self.select {
            map.insert(
                SELECT_FIELD.to_string(),
                Value::Array(select.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(map)
    }

    pub fn get(&self, field: &str) -> Option<&QueryValue> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: QueryValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<QueryValue> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.get(field).map_or(false, |v| !v.is_null())
    }

    /// Whether the client explicitly selected `field`.
    pub fn selects(&self, field: &str) -> bool {
        self.select
            .as_ref()
            .map_or(false, |fields| fields.iter().any(|f| f == field))
    }
}

fn parse_select(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn map_to_json(map: &BTreeMap<String, QueryValue>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Integral values render as JSON integers so that limits and counts keep
/// their client form.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
