//! CLI entry point for the footprint tool.

use anyhow::{Context, Result};
use clap::Parser;
use footprint_core::{
    AnalyticsStore, Curator, GlobalFootprintClient, IngestionPipeline, LocalObjectStore, Settings,
    TableSchema,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, RunArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Before the filter is built, so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env"),
    }

    let settings = load_settings(args.command.run_args())?;
    info!(
        start_year = settings.start_year,
        end_year = settings.end_year,
        raw_path = %settings.raw_path.display(),
        "footprint starting"
    );

    match &args.command {
        Command::Ingest(_) => ingest(&settings).await,
        Command::Curate(_) => curate(&settings).await,
        Command::Run(_) => {
            ingest(&settings).await?;
            curate(&settings).await
        }
    }
}

/// Environment settings with command-line overrides applied.
fn load_settings(overrides: &RunArgs) -> Result<Settings> {
    let mut settings = Settings::from_env().context("Invalid configuration")?;

    if let Some(start_year) = overrides.start_year {
        settings.start_year = start_year;
    }
    if let Some(end_year) = overrides.end_year {
        settings.end_year = end_year;
    }
    if overrides.update_countries {
        settings.update_countries = true;
    }
    if overrides.no_checkpoint {
        settings.checkpoint_enabled = false;
    }
    if let Some(raw_path) = &overrides.raw_path {
        settings.raw_path.clone_from(raw_path);
    }
    if let Some(database_path) = &overrides.database_path {
        settings.database_path.clone_from(database_path);
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

async fn ingest(settings: &Settings) -> Result<()> {
    let http = settings
        .api_client()
        .context("Failed to create API client")?;
    let api = GlobalFootprintClient::new(http);
    let store = LocalObjectStore::new(&settings.raw_path);

    let summary = IngestionPipeline::new(api, store, settings.ingest_options())
        .run()
        .await
        .context("Ingestion failed")?;

    info!(
        units = summary.units_persisted,
        soft_errors = summary.soft_errors.len(),
        last_year = summary.last_unit.as_ref().map(|unit| unit.year),
        last_country = summary.last_unit.as_ref().map(|unit| unit.country_code.as_str()),
        "Ingestion complete"
    );
    if let Some(report) = &summary.error_report {
        warn!(report = %report, "Some units failed; see the error report");
    }
    Ok(())
}

async fn curate(settings: &Settings) -> Result<()> {
    let store = LocalObjectStore::new(&settings.raw_path);
    let analytics = AnalyticsStore::open(&settings.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                settings.database_path.display()
            )
        })?;

    let summary = Curator::new(store, analytics, TableSchema::carbon_footprint())
        .run(settings.years())
        .await
        .context("Curation failed")?;

    info!(
        years_loaded = summary.years_loaded.len(),
        years_empty = summary.years_empty.len(),
        rows = summary.rows_upserted,
        "Curation complete"
    );
    Ok(())
}
