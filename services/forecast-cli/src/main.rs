//! Forecast query CLI
//!
//! Loads the service configuration, builds the element services and runs one
//! query against a forecast element, printing the client items as JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use element_service::{
    connect_object_storage, ElementBackends, MemoryItemStore, ServiceConfig, ServiceRegistry,
};
use forecast_common::ForecastItem;
use storage::{ForecastCatalog, ForecastRun, PgCatalog, RunCatalog};

/// Forecast query CLI
#[derive(Parser, Debug)]
#[command(name = "forecast-cli")]
#[command(about = "Query forecast samples and tiles of a forecast element")]
struct Args {
    /// Service configuration file
    #[arg(short, long, default_value = "config/forecasts.yaml", env = "FORECAST_CONFIG")]
    config: PathBuf,

    /// JSON array of item records of the element
    #[arg(short, long)]
    items: PathBuf,

    /// Forecast name
    #[arg(short, long)]
    forecast: String,

    /// Element name
    #[arg(short, long)]
    element: String,

    /// Query as a JSON object
    #[arg(short, long, default_value = "{}")]
    query: String,

    /// Query raster tiles instead of samples
    #[arg(long)]
    tiles: bool,

    /// Load forecast runs from the catalog database instead of the items
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Migrate the catalog database and register the runs of the items first
    #[arg(long, requires = "database_url")]
    register_runs: bool,

    /// Log level
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = ServiceConfig::load(&args.config)?;

    let items_json = std::fs::read_to_string(&args.items)
        .with_context(|| format!("Failed to read items: {:?}", args.items))?;
    let items: Vec<ForecastItem> = serde_json::from_str(&items_json)
        .with_context(|| format!("Failed to parse items: {:?}", args.items))?;
    let query: Value = serde_json::from_str(&args.query).context("Query is not valid JSON")?;

    let catalog: Arc<dyn ForecastCatalog> = match &args.database_url {
        Some(url) => {
            let pg = PgCatalog::connect(url).await?;
            if args.register_runs {
                pg.migrate().await?;
                for run in catalog_from_items(&items).runs() {
                    pg.register_run(&args.forecast, &args.element, run).await?;
                }
                info!("Registered item runs");
            }
            Arc::new(pg.load_catalog(&args.forecast, &args.element).await?)
        }
        None => Arc::new(catalog_from_items(&items)),
    };
    info!(
        forecast_times = catalog.list_forecast_times().len(),
        "Catalog loaded"
    );

    let item_store = Arc::new(MemoryItemStore::new(items));
    let object_storage = connect_object_storage(&config)?;
    let registry = ServiceRegistry::from_config(&config, object_storage, |_, _| ElementBackends {
        catalog: catalog.clone(),
        items: item_store.clone(),
    })?;

    let service = registry
        .get(&args.forecast, &args.element)
        .ok_or_else(|| anyhow!("Unknown element {}/{}", args.forecast, args.element))?;

    let results = if args.tiles {
        service.find_tiles(query).await?
    } else {
        service.find(query).await?
    };
    info!(count = results.len(), "Query complete");

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Group the forecast times of item records by run.
fn catalog_from_items(items: &[ForecastItem]) -> RunCatalog {
    let mut runs: BTreeMap<DateTime<Utc>, Vec<DateTime<Utc>>> = BTreeMap::new();
    for item in items {
        runs.entry(item.run_time).or_default().push(item.forecast_time);
    }

    RunCatalog::new(
        runs.into_iter()
            .map(|(run_time, forecast_times)| ForecastRun::new(run_time, forecast_times))
            .collect(),
    )
}
