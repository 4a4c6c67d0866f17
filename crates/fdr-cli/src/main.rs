use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fdr_core::Platform;
use fdr_engine::{AggregationEngine, EngineConfig, SourceRegistry};
use fdr_store::DealStore;
use fdr_web::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "fdr-cli")]
#[command(about = "Flash Deal Radar command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one refresh cycle across every enabled source and exit.
    Refresh,
    /// Refresh a single platform and exit.
    RefreshOne { platform: Platform },
    /// Serve the JSON API, with the optional cron-driven refresh.
    Serve,
    /// Print summary metrics after one refresh cycle.
    Stats,
}

fn build_engine(store: Arc<DealStore>, config: &EngineConfig) -> Result<Arc<AggregationEngine>> {
    let registry = SourceRegistry::load(&config.sources_path)?;
    Ok(Arc::new(AggregationEngine::new(store, config, registry)?))
}

fn print_report(report: &fdr_engine::RefreshReport) {
    println!(
        "refresh complete: run_id={} admitted={} expired_cleared={}",
        report.run_id, report.total_admitted, report.expired_cleared
    );
    for source in &report.sources {
        match &source.error {
            Some(error) => println!("  {}: failed ({error})", source.platform),
            None => println!(
                "  {}: admitted={} below_threshold={} invalid={}",
                source.platform, source.admitted, source.below_threshold, source.invalid
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fdr_engine=info,fdr_web=info,fdr_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let store = Arc::new(DealStore::new());
    let engine = build_engine(Arc::clone(&store), &config)?;

    match cli.command.unwrap_or(Commands::Refresh) {
        Commands::Refresh => {
            let report = engine.refresh().await?;
            print_report(&report);
        }
        Commands::RefreshOne { platform } => {
            let outcome = engine.refresh_one(platform).await?;
            println!(
                "{}: admitted={} below_threshold={} invalid={}",
                outcome.platform, outcome.admitted, outcome.below_threshold, outcome.invalid
            );
        }
        Commands::Serve => {
            let scheduler = engine.maybe_build_scheduler(&config).await?;
            if let Some(scheduler) = &scheduler {
                scheduler.start().await.context("starting scheduler")?;
                tracing::info!(cron = %config.refresh_cron, "scheduled refresh enabled");
            }
            fdr_web::serve(AppState::new(store, engine)).await?;
        }
        Commands::Stats => {
            if let Err(err) = engine.refresh().await {
                tracing::warn!(error = %err, "refresh before stats failed");
            }
            let stats = store.stats(Utc::now()).await;
            println!(
                "deals={} avg_discount={}% best_discount={}% platforms={}",
                stats.total_deals, stats.avg_discount, stats.best_discount, stats.platforms
            );
        }
    }

    Ok(())
}
