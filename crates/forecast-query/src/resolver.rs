//! Nearest stored forecast time lookup.

use chrono::{DateTime, Utc};

use forecast_common::{format_instant, ForecastError, ForecastResult};

/// The catalog forecast time closest to `instant`.
///
/// On a tie the earlier forecast time wins. The catalog need not be sorted.
pub fn nearest_forecast_time(
    instant: DateTime<Utc>,
    catalog_times: &[DateTime<Utc>],
) -> ForecastResult<DateTime<Utc>> {
    catalog_times
        .iter()
        .copied()
        .min_by_key(|t| ((*t - instant).num_milliseconds().unsigned_abs(), *t))
        .ok_or_else(|| {
            ForecastError::NoForecastAvailable(format!(
                "no forecast time available near {}",
                format_instant(&instant)
            ))
        })
}

/// Inclusive range of the forecast times nearest to `from` and `to`.
pub fn nearest_forecast_range(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    catalog_times: &[DateTime<Utc>],
) -> ForecastResult<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((
        nearest_forecast_time(from, catalog_times)?,
        nearest_forecast_time(to, catalog_times)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::time::{hours, three_hourly};

    #[test]
    fn test_tie_prefers_earlier_time() {
        let catalog = vec![hours(4), hours(2)];
        assert_eq!(nearest_forecast_time(hours(3), &catalog).unwrap(), hours(2));
    }

    #[test]
    fn test_nearest_time() {
        let catalog = three_hourly();
        let instant = hours(4) + chrono::Duration::minutes(40);
        assert_eq!(nearest_forecast_time(instant, &catalog).unwrap(), hours(6));
        assert_eq!(nearest_forecast_time(hours(-5), &catalog).unwrap(), hours(0));
        assert_eq!(nearest_forecast_time(hours(30), &catalog).unwrap(), hours(9));
    }

    #[test]
    fn test_empty_catalog() {
        let err = nearest_forecast_time(hours(0), &[]).unwrap_err();
        assert!(matches!(err, ForecastError::NoForecastAvailable(_)));
        assert!(nearest_forecast_range(hours(0), hours(3), &[]).is_err());
    }

    #[test]
    fn test_range() {
        let catalog = three_hourly();
        let (from, to) =
            nearest_forecast_range(hours(0), hours(5), &catalog).unwrap();
        assert_eq!((from, to), (hours(0), hours(6)));
    }
}
