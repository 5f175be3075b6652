//! Entry point for the grading core.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gradecore::rpc::GrpcConnector;
use gradecore::runner::DockerEngine;
use gradecore::{AmqpTransport, Config, Fetcher, Gateway, GradingService, RunnerPool};
use tracing::{info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
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

    info!(config = %args.config.display(), "grading core starting");

    let config = Config::load(&args.config)?;
    config.warn_reserved_fields();

    let engine = Arc::new(DockerEngine::new(
        config.cpu_limit_hard,
        config.memory_limit_hard,
    )?);
    let pool = Arc::new(RunnerPool::new(engine, Arc::new(GrpcConnector::new())));

    // Recover from a crashed predecessor; a failed sweep is not fatal.
    if let Err(error) = pool.cleanup_stray().await {
        warn!(%error, "startup cleanup failed");
    }

    let grader = Arc::new(GradingService::new(
        Arc::clone(&pool),
        Fetcher::new(),
        config.templates.clone(),
    ));

    let transport = Arc::new(AmqpTransport::new(config.amqp_url.clone()));
    let mut gateway = Gateway::new(
        transport,
        grader,
        config.concurrency,
        Duration::from_millis(config.tick_period),
    );

    let reaper = tokio::spawn(Arc::clone(&pool).run());

    info!(
        concurrency = config.concurrency,
        tick_period_ms = config.tick_period,
        languages = config.templates.len(),
        "grading core running"
    );

    tokio::select! {
        () = gateway.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown signal received");
        }
    }

    gateway.stop();
    pool.stop();
    pool.shutdown().await;
    reaper.abort();

    info!("grading core stopped");
    Ok(())
}
