//! Forecast-run catalog, in memory or backed by PostgreSQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use forecast_common::{ForecastError, ForecastResult};

/// One model execution and the discrete forecast times it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRun {
    pub run_time: DateTime<Utc>,
    pub forecast_times: Vec<DateTime<Utc>>,
}

impl ForecastRun {
    pub fn new(run_time: DateTime<Utc>, forecast_times: Vec<DateTime<Utc>>) -> Self {
        Self {
            run_time,
            forecast_times,
        }
    }
}

/// Read-only view of the forecast times available for an element.
pub trait ForecastCatalog: Send + Sync {
    /// All available forecast times, sorted ascending, without duplicates.
    fn list_forecast_times(&self) -> Vec<DateTime<Utc>>;
}

/// Catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct RunCatalog {
    runs: Vec<ForecastRun>,
}

impl RunCatalog {
    pub fn new(mut runs: Vec<ForecastRun>) -> Self {
        runs.sort_by_key(|run| run.run_time);
        Self { runs }
    }

    pub fn runs(&self) -> &[ForecastRun] {
        &self.runs
    }

    /// Most recent run, if any.
    pub fn latest_run(&self) -> Option<&ForecastRun> {
        self.runs.last()
    }
}

impl ForecastCatalog for RunCatalog {
    fn list_forecast_times(&self) -> Vec<DateTime<Utc>> {
        self.runs
            .iter()
            .flat_map(|run| run.forecast_times.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Forecast runs registered in PostgreSQL.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str) -> ForecastResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| ForecastError::Storage(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> ForecastResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ForecastError::Storage(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Register the forecast times of a run.
    #[instrument(skip(self, run), fields(run_time = %run.run_time))]
    pub async fn register_run(
        &self,
        forecast: &str,
        element: &str,
        run: &ForecastRun,
    ) -> ForecastResult<()> {
        for forecast_time in &run.forecast_times {
            sqlx::query(
                r#"
                INSERT INTO forecast_runs (forecast, element, run_time, forecast_time)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (forecast, element, run_time, forecast_time) DO NOTHING
                "#,
            )
            .bind(forecast)
            .bind(element)
            .bind(run.run_time)
            .bind(forecast_time)
            .execute(&self.pool)
            .await
            .map_err(|e| ForecastError::Storage(format!("Insert failed: {}", e)))?;
        }

        Ok(())
    }

    /// Load every run registered for an element.
    #[instrument(skip(self))]
    pub async fn load_runs(
        &self,
        forecast: &str,
        element: &str,
    ) -> ForecastResult<Vec<ForecastRun>> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT run_time, forecast_time FROM forecast_runs \
             WHERE forecast = $1 AND element = $2 \
             ORDER BY run_time ASC, forecast_time ASC",
        )
        .bind(forecast)
        .bind(element)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ForecastError::Storage(format!("Query failed: {}", e)))?;

        debug!(rows = rows.len(), "Loaded forecast run rows");
        Ok(group_runs(rows))
    }

    /// Snapshot the element's runs into an in-memory catalog.
    pub async fn load_catalog(&self, forecast: &str, element: &str) -> ForecastResult<RunCatalog> {
        Ok(RunCatalog::new(self.load_runs(forecast, element).await?))
    }
}

/// Internal row type for database queries.
#[derive(FromRow)]
struct RunRow {
    run_time: DateTime<Utc>,
    forecast_time: DateTime<Utc>,
}

fn group_runs(rows: Vec<RunRow>) -> Vec<ForecastRun> {
    let mut runs: BTreeMap<DateTime<Utc>, Vec<DateTime<Utc>>> = BTreeMap::new();
    for row in rows {
        runs.entry(row.run_time).or_default().push(row.forecast_time);
    }
    runs.into_iter()
        .map(|(run_time, forecast_times)| ForecastRun::new(run_time, forecast_times))
        .collect()
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS forecast_runs (
    forecast VARCHAR(100) NOT NULL,
    element VARCHAR(100) NOT NULL,
    run_time TIMESTAMPTZ NOT NULL,
    forecast_time TIMESTAMPTZ NOT NULL,
    registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    UNIQUE(forecast, element, run_time, forecast_time)
);

CREATE INDEX IF NOT EXISTS idx_forecast_runs_element ON forecast_runs(forecast, element);
CREATE INDEX IF NOT EXISTS idx_forecast_runs_forecast_time ON forecast_runs(forecast_time)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::time::hours;

    #[test]
    fn test_forecast_times_are_sorted_and_unique() {
        let catalog = RunCatalog::new(vec![
            ForecastRun::new(hours(6), vec![hours(6), hours(9), hours(12)]),
            ForecastRun::new(hours(0), vec![hours(0), hours(3), hours(6), hours(9)]),
        ]);

        assert_eq!(
            catalog.list_forecast_times(),
            vec![hours(0), hours(3), hours(6), hours(9), hours(12)]
        );
        assert_eq!(catalog.latest_run().unwrap().run_time, hours(6));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = RunCatalog::default();
        assert!(catalog.list_forecast_times().is_empty());
        assert!(catalog.latest_run().is_none());
    }

    #[test]
    fn test_group_runs() {
        let rows = vec![
            RunRow {
                run_time: hours(0),
                forecast_time: hours(0),
            },
            RunRow {
                run_time: hours(0),
                forecast_time: hours(3),
            },
            RunRow {
                run_time: hours(6),
                forecast_time: hours(6),
            },
        ];
        let runs = group_runs(rows);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].forecast_times, vec![hours(0), hours(3)]);
        assert_eq!(runs[1].run_time, hours(6));
    }

    #[test]
    fn test_run_serde_shape() {
        let run = ForecastRun::new(hours(0), vec![hours(3)]);
        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["runTime"], "2024-01-01T00:00:00Z");
        assert_eq!(value["forecastTimes"][0], "2024-01-01T03:00:00Z");
    }
}
