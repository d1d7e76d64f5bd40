//! Main entry point for the arena matchmaker service
//!
//! Production deployments embed the engine behind their own collaborator
//! wiring; this binary runs it against the in-memory collaborators for
//! development and operational smoke testing.

use anyhow::Result;
use arena_matchmaker::config::AppConfig;
use arena_matchmaker::matchmaker::pipeline::{PipelineConfig, SkillBasedMatchmaker};
use arena_matchmaker::metrics::MetricsCollector;
use arena_matchmaker::service::MatchmakerService;
use arena_matchmaker::store::memory::InMemoryCollaborators;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Arena Matchmaker - skill-based matchmaking engine
#[derive(Parser)]
#[command(
    name = "arena-matchmaker",
    version,
    about = "Skill-based matchmaking engine for competitive VR arena and combat matches",
    long_about = "Validates candidate matches against ticket shape, reachability, and \
                  party-preservation constraints, balances them into opposing teams with \
                  Weng-Lin ratings, predicts outcomes, and selects a disjoint set of \
                  matches to form."
)]
struct Args {
    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit without starting the service
    #[arg(long)]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn display_startup_banner(config: &AppConfig) {
    info!("Arena Matchmaker");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Max rank delta: {}", config.matchmaker.max_rank_delta);
    info!(
        "   Default max RTT: {}ms",
        config.matchmaker.default_max_rtt_ms
    );
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Periodically log the latest pipeline snapshot for operators
async fn state_log_task(service: Arc<MatchmakerService>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let state = service.matchmaker_state();
        info!(
            candidates = state.stats.candidate_count,
            matches = state.stats.match_count,
            tickets = state.index.len(),
            "Matchmaker state"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    let metrics = match MetricsCollector::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!("Failed to initialize metrics: {}", e);
            std::process::exit(1);
        }
    };

    let collaborators = Arc::new(InMemoryCollaborators::new());
    let pipeline = Arc::new(SkillBasedMatchmaker::new(PipelineConfig {
        max_rank_delta: config.matchmaker.max_rank_delta,
        default_rank_percentile: config.matchmaker.default_rank_percentile,
        ..PipelineConfig::default()
    }));

    let service = Arc::new(MatchmakerService::new(
        pipeline,
        collaborators.clone(),
        collaborators,
        metrics,
        config.matchmaker.candidate_dump_limit_bytes,
    ));

    let state_task = {
        let service = service.clone();
        let interval = config.state_log_interval();
        tokio::spawn(async move {
            state_log_task(service, interval).await;
        })
    };

    info!("Arena Matchmaker is running; awaiting candidate batches");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, stopping");
    state_task.abort();

    info!("Arena Matchmaker stopped");
    Ok(())
}
