mod cities;
mod db;
mod docstore;
mod error;
mod fetch;
mod ingest;
mod normalize;
mod pg;
mod schedule;
mod settings;
mod weather;

use std::fmt::Display;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::db::{RelationalTarget, WeatherTable};
use crate::docstore::{DocumentStore, MongoStore};
use crate::fetch::HttpPages;
use crate::ingest::{IngestConfig, IngestRunner};
use crate::normalize::LoadOutcome;
use crate::pg::PgWeatherTable;
use crate::schedule::{Scheduler, TokioSleeper};
use crate::settings::{RelationalBackend, Settings};
use crate::weather::OpenWeather;

#[derive(Parser)]
#[command(name = "weather_pipeline", about = "City weather ingestion into MongoDB and a relational weather table")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape cities, fetch their weather and store the raw documents, on a schedule
    Ingest {
        /// Cities to keep per run (default: WEATHER_CITY_LIMIT or 10)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Number of runs, 0 = unlimited (default: WEATHER_MAX_ITERATIONS or 5)
        #[arg(short, long)]
        iterations: Option<u32>,
        /// Seconds between runs (default: WEATHER_SLEEP_SECS or 1800)
        #[arg(short, long)]
        sleep_secs: Option<u64>,
    },
    /// Flatten every stored document into the weather table
    Extract,
    /// Show document and row counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Ingest { limit, iterations, sleep_secs } => {
            if let Some(n) = limit {
                settings.city_limit = n;
            }
            if let Some(n) = iterations {
                settings.max_iterations = n;
            }
            if let Some(s) = sleep_secs {
                settings.sleep_secs = s;
            }
            ingest(&settings).await
        }
        Commands::Extract => extract(&settings).await,
        Commands::Stats => stats(&settings).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn ingest(settings: &Settings) -> anyhow::Result<()> {
    let config = IngestConfig {
        listing_url: settings.listing_url.clone(),
        credential: settings.api_key()?.to_string(),
        city_limit: settings.city_limit,
    };

    let client = reqwest::Client::new();
    let store = MongoStore::connect(
        &settings.mongo_uri,
        &settings.mongo_database,
        &settings.mongo_collection,
    )
    .await?;
    let runner = IngestRunner::new(
        config,
        HttpPages::new(client.clone()),
        OpenWeather::new(client, settings.weather_endpoint.as_str()),
        store,
    );

    let runner = &runner;
    let mut scheduler = Scheduler::new(settings.schedule_plan(), TokioSleeper);
    let summary = scheduler
        .run(move |_| async move {
            let report = runner.run().await?;
            report.print();
            anyhow::Ok(())
        })
        .await;

    println!(
        "Ran {} iterations ({} failed, slept {} times).",
        summary.runs, summary.failures, summary.sleeps
    );
    Ok(())
}

async fn extract(settings: &Settings) -> anyhow::Result<()> {
    let store = MongoStore::connect(
        &settings.mongo_uri,
        &settings.mongo_database,
        &settings.mongo_collection,
    )
    .await?;

    match settings.relational {
        RelationalBackend::Postgres => {
            load_into(&store, &PgWeatherTable::new(settings.server_address())).await
        }
        RelationalBackend::Sqlite => load_into(&store, &WeatherTable::new(&settings.sqlite_path)).await,
    }
}

async fn load_into<T: RelationalTarget + Display>(store: &MongoStore, table: &T) -> anyhow::Result<()> {
    match normalize::extract(store, table).await? {
        LoadOutcome::Loaded(n) => println!("Loaded {} rows into {}", n, table),
        LoadOutcome::Nothing => println!("No documents in the collection, nothing to load."),
    }
    Ok(())
}

async fn stats(settings: &Settings) -> anyhow::Result<()> {
    let store = MongoStore::connect(
        &settings.mongo_uri,
        &settings.mongo_database,
        &settings.mongo_collection,
    )
    .await?;
    let documents = store.count().await.context("Failed to count documents")?;
    let rows = match settings.relational {
        RelationalBackend::Postgres => PgWeatherTable::new(settings.server_address()).count().await,
        RelationalBackend::Sqlite => WeatherTable::new(&settings.sqlite_path).count().await,
    }
    .context("Failed to count weather rows")?;

    println!("Documents: {}", documents);
    println!("Rows:      {}", rows);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
