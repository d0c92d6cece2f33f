mod accuracy;
mod api;
mod backfill;
mod config;
mod db;
mod error;
mod horizon;
mod oracle;
mod recorder;
mod types;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::accuracy::AccuracyAggregator;
use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::backfill::{backfill_and_recompute, run_scheduled, Backfill};
use crate::config::{Config, PlanStrategy};
use crate::db::Store;
use crate::error::Result;
use crate::oracle::{CoinGeckoClient, LatencyStats, PriceOracle};
use crate::recorder::OutcomeRecorder;
use crate::types::Horizon;

#[derive(Parser, Debug)]
#[command(name = "verifier")]
#[command(about = "Verify prediction outcomes against market prices and track signal accuracy")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill in every missing outcome once, then rebuild accuracy stats
    Backfill {
        /// Override BACKFILL_PLANNER (`scan` or `query`)
        #[arg(long)]
        planner: Option<String>,
    },

    /// Rebuild accuracy stats from stored outcomes and print training readiness
    Recompute,

    /// Run the scheduled backfill and recompute loops behind the HTTP API (default)
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg, cli.command.unwrap_or(Command::Serve)).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(mut cfg: Config, command: Command) -> Result<()> {
    // --- Database setup ---
    let store = Store::open(&cfg.db_path).await?;

    let aggregator = AccuracyAggregator::new(store.clone(), cfg.min_training_samples);

    match command {
        Command::Recompute => {
            let stats = aggregator.recompute_stats().await?;
            info!("Rebuilt {} accuracy groups", stats.len());
            for horizon in Horizon::ALL {
                let ready = aggregator.is_ready_to_train(horizon).await?;
                info!(horizon = %horizon, ready, "{horizon} ready to train: {ready}");
            }
            Ok(())
        }
        Command::Backfill { planner } => {
            if let Some(p) = planner {
                cfg.backfill.planner = p.parse::<PlanStrategy>()?;
            }
            let (backfill, _, _) = build_backfill(&cfg, &store)?;
            let stats = backfill_and_recompute(&backfill, &aggregator).await?;
            info!(
                "Backfill finished: {} recorded, {} already present, {} errors",
                stats.outcomes_recorded, stats.outcomes_already_present, stats.errors,
            );
            Ok(())
        }
        Command::Serve => serve(cfg, store, aggregator).await,
    }
}

/// Wire the oracle client, recorder and health state into a backfill job.
fn build_backfill(
    cfg: &Config,
    store: &Store,
) -> Result<(Backfill, Arc<HealthState>, Arc<LatencyStats>)> {
    let latency = Arc::new(LatencyStats::new());
    let oracle: Arc<dyn PriceOracle> =
        Arc::new(CoinGeckoClient::from_config(cfg, Arc::clone(&latency))?);
    let recorder = OutcomeRecorder::new(store.clone(), cfg.scoring);
    let health = Arc::new(HealthState::new());

    let backfill = Backfill::new(
        store.clone(),
        oracle,
        recorder,
        cfg.backfill.clone(),
        Arc::clone(&health),
    );
    Ok((backfill, health, latency))
}

async fn serve(cfg: Config, store: Store, aggregator: AccuracyAggregator) -> Result<()> {
    let (backfill, health, latency) = build_backfill(&cfg, &store)?;

    // Backfill + recompute (background, every BACKFILL_INTERVAL_SECS)
    let scheduled_aggregator = aggregator.clone();
    let backfill_every = cfg.backfill_interval;
    tokio::spawn(async move { run_scheduled(backfill, scheduled_aggregator, backfill_every).await });

    // Standalone recompute (background, every RECOMPUTE_INTERVAL_SECS)
    let recompute_aggregator = aggregator.clone();
    let recompute_every = cfg.recompute_interval;
    tokio::spawn(async move { recompute_aggregator.run(recompute_every).await });

    // HTTP API server
    let api_state = ApiState {
        store,
        aggregator,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
