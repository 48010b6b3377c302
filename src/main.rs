use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use traffic_rs::{AnomalyView, RowView, TrafficConfig, TrafficEngine, TrafficEngineBuilder};

#[derive(Parser)]
#[command(name = "traffic-rs")]
#[command(about = "Traffic window ingestion and subscriber anomaly queries", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingest files matching this pattern before running the command
    #[arg(short, long)]
    load: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest measurement files into the store
    Ingest {
        /// Glob pattern, defaults to `ingest.pattern` from the config
        pattern: Option<String>,
    },
    /// Print every anomalous row
    Anomalies,
    /// Print the history of one subscriber
    Subscriber {
        /// Subscriber identifier
        id: u64,
    },
    /// Print aggregate statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, results to stdout
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => TrafficConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TrafficConfig::default(),
    };
    let engine = TrafficEngineBuilder::new()
        .with_config(config)
        .build()
        .await?;

    if let Some(pattern) = &cli.load {
        let report = engine
            .ingest_pattern(pattern)
            .await
            .with_context(|| format!("ingesting {}", pattern))?;
        eprintln!(
            "Loaded {} rows into {} batches",
            report.rows_kept, report.batches_written
        );
    }

    run(&engine, cli.command).await
}

async fn run(engine: &TrafficEngine, command: Command) -> anyhow::Result<()> {
    let queries = engine.query_service();
    match command {
        Command::Ingest { pattern } => {
            let pattern = pattern
                .or_else(|| engine.config().ingest.pattern.clone())
                .context("no pattern given and ingest.pattern is not configured")?;
            let report = engine.ingest_pattern(&pattern).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Anomalies => {
            let anomalies = queries.list_anomalies().await?;
            let count = anomalies.len();
            for anomaly in anomalies {
                println!("{}", serde_json::to_string(&AnomalyView::from(anomaly))?);
            }
            eprintln!("{} anomalies", count);
        }
        Command::Subscriber { id } => {
            for row in queries.get_subscriber(id).await? {
                println!("{}", serde_json::to_string(&RowView::from(row))?);
            }
        }
        Command::Stats => {
            let stats = queries.get_statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
