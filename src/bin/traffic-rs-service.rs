//! HTTP service binary for traffic-rs
//!
//! Optionally ingests a directory of measurement files, then serves the
//! anomaly, subscriber and statistics queries over REST.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use traffic_rs::service::TrafficService;
use traffic_rs::{TrafficConfig, TrafficEngineBuilder};

#[derive(Parser)]
#[command(name = "traffic-rs-service")]
#[command(about = "Traffic anomaly query service", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP service port, overrides `service.http_port`
    #[arg(long)]
    http_port: Option<u16>,

    /// Ingest files matching this pattern before serving
    #[arg(short, long)]
    ingest: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup logging
    if args.json_logs {
        traffic_rs::init_tracing();
    } else if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    info!("Starting traffic-rs service");

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            TrafficConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?
        }
        None => TrafficConfig::default(),
    };
    let http_port = args.http_port.unwrap_or(config.service.http_port);
    let settings = config.service.clone();
    let pattern = args.ingest.clone().or_else(|| config.ingest.pattern.clone());

    let engine = TrafficEngineBuilder::new()
        .with_config(config)
        .build()
        .await?;

    if let Some(pattern) = pattern {
        info!("Ingesting {}", pattern);
        let report = engine
            .ingest_pattern(&pattern)
            .await
            .with_context(|| format!("ingesting {}", pattern))?;
        info!(
            "Ingested {} rows into {} batches ({} dropped, {} failed sources)",
            report.rows_kept,
            report.batches_written,
            report.total_dropped(),
            report.sources_failed
        );
    }

    let service = TrafficService::with_settings(Arc::new(engine.query_service()), settings);
    let addr: SocketAddr = ([0, 0, 0, 0], http_port).into();

    info!("Service ready");
    info!("  HTTP: http://localhost:{}/api/statistics", http_port);
    info!("Press Ctrl+C to shutdown");

    let shutdown = tokio::signal::ctrl_c();

    tokio::select! {
        result = service.serve(addr) => {
            if let Err(e) = result {
                error!("Service error: {}", e);
                std::process::exit(1);
            }
        }
        _ = shutdown => {
            info!("Shutdown signal received");
        }
    }

    info!("Service stopped");
    Ok(())
}
