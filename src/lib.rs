//! Windowed ingestion and per-subscriber anomaly detection for network
//! traffic measurements
//!
//! Measurement files are folded into hour windows of six 10-minute
//! sub-windows, stored per `(node, hour)` in a key-value store, and queried
//! for subscribers whose traffic exceeds their own baseline.
//!
//! # Example
//!
//! ```no_run
//! use traffic_rs::TrafficEngineBuilder;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = TrafficEngineBuilder::new()
//!     .anomaly_threshold(3.0)
//!     .build()
//!     .await?;
//!
//! // Ingest every measurement file of a directory
//! let report = engine.ingest_pattern("telecom10k/*").await?;
//! tracing::info!("wrote {} batches", report.batches_written);
//!
//! // Query the stored history
//! let queries = engine.query_service();
//! for anomaly in queries.list_anomalies().await? {
//!     println!("{} uploaded {}", anomaly.row.subscriber_id, anomaly.row.up_bytes);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Re-export commonly used items
pub use aggregation::{Batch, HourRun, SlotAssignment, WindowAggregator, WindowConfig};
pub use anomaly::{AnomalyDetector, AnomalyRecord, Deviation, SubscriberBaseline};
pub use config::TrafficConfig;
pub use error::{Result, TrafficError};
pub use ingest::{IngestPipeline, IngestReport};
pub use query::{AnomalyView, QueryService, RowView, Statistics, TimeRange};
pub use row::{DropReason, Normalizer, RawRecord, RetentionPolicy, RowOutcome, TrafficRow};
pub use store::{BatchStore, KeyRead, KeyValueStore, MemoryStore, SharedStore, StorageKey};

/// Error types
pub mod error;

/// Canonical rows and normalization
pub mod row;

/// Measurement file discovery and parsing
pub mod source;

/// Hour-window run assembly
pub mod aggregation;

/// Batch persistence
pub mod store;

/// Per-subscriber anomaly scoring
pub mod anomaly;

/// Read-side queries and statistics
pub mod query;

/// Ingestion pipeline
pub mod ingest;

/// File-based configuration
pub mod config;

/// Core engine implementation
pub mod engine;

pub use engine::TrafficEngine;

/// HTTP service layer
#[cfg(feature = "service")]
pub mod service;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with default settings
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Builder for configuring the traffic engine
#[derive(Clone, Default)]
pub struct TrafficEngineBuilder {
    /// Engine configuration
    pub config: TrafficConfig,
    /// Store to use instead of the configured backend
    pub store: Option<SharedStore>,
}

impl TrafficEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a full configuration
    pub fn with_config(mut self, config: TrafficConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing store handle
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the anomaly multiplier `k`
    pub fn anomaly_threshold(mut self, threshold: f64) -> Self {
        self.config.anomaly.threshold = threshold;
        self
    }

    /// Set the deviation estimator
    pub fn deviation(mut self, deviation: Deviation) -> Self {
        self.config.anomaly.deviation = deviation;
        self
    }

    /// Set the retention cutoff (`YYYY-MM-DD HH:MM:SS`)
    pub fn cutoff(mut self, cutoff: impl Into<String>) -> Self {
        self.config.ingest.cutoff = cutoff.into();
        self
    }

    /// Set the window geometry
    pub fn window(mut self, window: WindowConfig) -> Self {
        self.config.ingest.window = window;
        self
    }

    /// Bound the number of keys read concurrently per query
    pub fn scan_concurrency(mut self, scan_concurrency: usize) -> Self {
        self.config.service.scan_concurrency = scan_concurrency;
        self
    }

    /// Build the engine
    pub async fn build(self) -> Result<TrafficEngine> {
        TrafficEngine::new(self).await
    }

    /// Validated configuration and a connected store
    pub(crate) async fn into_parts(self) -> Result<(TrafficConfig, SharedStore)> {
        self.config.validate()?;
        let store = match self.store {
            Some(store) => store,
            None => connect_store(&self.config.store).await?,
        };
        Ok((self.config, store))
    }
}

async fn connect_store(config: &config::StoreConfig) -> Result<SharedStore> {
    match config.backend {
        config::StoreBackend::Memory => Ok(std::sync::Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        config::StoreBackend::Redis => Ok(std::sync::Arc::new(
            store::RedisStore::connect(&config.redis_url).await?,
        )),
        #[cfg(not(feature = "redis"))]
        config::StoreBackend::Redis => Err(TrafficError::Config(
            "redis backend requested but traffic-rs was built without the `redis` feature"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_builder_defaults() {
        let builder = TrafficEngineBuilder::new();
        assert_eq!(builder.config, TrafficConfig::default());
        assert!(builder.store.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = TrafficEngineBuilder::new()
            .anomaly_threshold(1.5)
            .deviation(Deviation::Population)
            .cutoff("2024-02-01 00:00:00")
            .scan_concurrency(2)
            .with_store(Arc::new(MemoryStore::new()));

        assert_eq!(builder.config.anomaly.threshold, 1.5);
        assert_eq!(builder.config.anomaly.deviation, Deviation::Population);
        assert_eq!(builder.config.ingest.cutoff, "2024-02-01 00:00:00");
        assert_eq!(builder.config.service.scan_concurrency, 2);
        assert!(builder.store.is_some());
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let result = TrafficEngineBuilder::new().cutoff("not a date").build().await;
        assert!(matches!(result, Err(TrafficError::Config(_))));
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_backend_requires_feature() {
        let mut config = TrafficConfig::default();
        config.store.backend = config::StoreBackend::Redis;
        let result = TrafficEngineBuilder::new().with_config(config).build().await;
        assert!(matches!(result, Err(TrafficError::Config(_))));
    }
}
