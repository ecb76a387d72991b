//! Forecast item records as stored and as returned to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Aggregate statistics over a sample sequence.
///
/// Both bounds are `None` when every sample is missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMax {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// A forecast sample/tile record as held by the record store.
///
/// `file_path` and `converted_file_path` are server-internal locators into
/// the byte store and never leave the service; see [`ClientItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub run_time: DateTime<Utc>,
    pub forecast_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_file_path: Option<String>,
    /// Inline samples, only set for record-store backed elements
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_samples"
    )]
    pub data: Option<Vec<f64>>,
    /// Any other record field, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ForecastItem {
    /// Create an item for a run/forecast time pair.
    pub fn new(run_time: DateTime<Utc>, forecast_time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            run_time,
            forecast_time,
            geometry: None,
            file_path: None,
            converted_file_path: None,
            data: None,
            extra: Map::new(),
        }
    }

    /// Set the converted payload locator.
    pub fn with_converted_file_path(mut self, path: impl Into<String>) -> Self {
        self.converted_file_path = Some(path.into());
        self
    }

    /// Set the raw file locator.
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set inline sample data.
    pub fn with_data(mut self, data: Vec<f64>) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the item geometry.
    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Drop the storage locators, keeping everything a client may see.
    pub fn into_client(self) -> ClientItem {
        ClientItem {
            id: self.id,
            run_time: self.run_time,
            forecast_time: self.forecast_time,
            geometry: self.geometry,
            data: self.data,
            stats: None,
            extra: self.extra,
        }
    }
}

/// A forecast record safe to return to a client.
///
/// Carries no storage locator fields at all. `data` is only present when the
/// client selected it, and `min`/`max` only after resampling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientItem {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub run_time: DateTime<Utc>,
    pub forecast_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<f64>>,
    #[serde(flatten)]
    pub stats: Option<MinMax>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode a raster payload: a JSON array of numbers where `null` marks a
/// missing sample.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f64>, serde_json::Error> {
    let raw: Vec<Option<f64>> = serde_json::from_slice(bytes)?;
    Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn deserialize_samples<'de, D>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<f64>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|samples| {
        samples
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn item() -> ForecastItem {
        let run = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let forecast = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        ForecastItem::new(run, forecast)
            .with_file_path("raw/2024010100.grib")
            .with_converted_file_path("converted/2024010103.json")
    }

    #[test]
    fn test_deserialize_record_with_missing_samples() {
        let value = json!({
            "_id": "abc",
            "runTime": "2024-01-01T00:00:00Z",
            "forecastTime": "2024-01-01T03:00:00Z",
            "data": [1.0, null, 3.5],
            "level": 850
        });
        let item: ForecastItem = serde_json::from_value(value).unwrap();

        assert_eq!(item.id.as_deref(), Some("abc"));
        let data = item.data.unwrap();
        assert_eq!(data[0], 1.0);
        assert!(data[1].is_nan());
        assert_eq!(item.extra.get("level"), Some(&json!(850)));
    }

    #[test]
    fn test_client_item_has_no_locators() {
        let client = item().into_client();
        let value = serde_json::to_value(&client).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("filePath"));
        assert!(!object.contains_key("convertedFilePath"));
        assert!(!object.contains_key("data"));
        assert!(!object.contains_key("min"));
        assert_eq!(object["forecastTime"], json!("2024-01-01T03:00:00Z"));
    }

    #[test]
    fn test_client_item_serializes_stats_and_missing_samples() {
        let mut client = item().into_client();
        client.data = Some(vec![f64::NAN, 2.0]);
        client.stats = Some(MinMax {
            min: Some(2.0),
            max: Some(2.0),
        });
        let value = serde_json::to_value(&client).unwrap();

        assert_eq!(value["data"], json!([null, 2.0]));
        assert_eq!(value["min"], json!(2.0));
        assert_eq!(value["max"], json!(2.0));
    }

    #[test]
    fn test_decode_samples() {
        let data = decode_samples(b"[0, 1.5, null, -2]").unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(data[1], 1.5);
        assert!(data[2].is_nan());

        assert!(decode_samples(b"{\"not\": \"an array\"}").is_err());
        assert!(decode_samples(b"[1, 2").is_err());
    }
}
