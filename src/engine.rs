//! Core engine: one store shared by the ingestion and query sides

use crate::aggregation::WindowAggregator;
use crate::anomaly::AnomalyDetector;
use crate::config::TrafficConfig;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::query::QueryService;
use crate::row::{Normalizer, RetentionPolicy};
use crate::source::{self, Source};
use crate::store::{BatchStore, SharedStore};
use crate::{Result, TrafficEngineBuilder};
use tracing::{info, warn};

/// The traffic ingestion and anomaly query engine
#[derive(Clone)]
pub struct TrafficEngine {
    store: SharedStore,
    config: TrafficConfig,
    policy: RetentionPolicy,
}

impl TrafficEngine {
    /// Create an engine from a builder configuration
    pub async fn new(builder: TrafficEngineBuilder) -> Result<Self> {
        let (config, store) = builder.into_parts().await?;
        let policy = config.ingest.retention_policy()?;
        info!(
            backend = store.name(),
            threshold = config.anomaly.threshold,
            "traffic engine ready"
        );
        Ok(Self {
            store,
            config,
            policy,
        })
    }

    /// Shared key-value store
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Effective configuration
    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Anomaly detector configured for this engine
    pub fn detector(&self) -> AnomalyDetector {
        AnomalyDetector::new(self.config.anomaly.threshold)
            .with_deviation(self.config.anomaly.deviation)
    }

    /// Ingestion pipeline writing into the engine's store
    pub fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(
            Normalizer::new(self.policy.clone()),
            WindowAggregator::new(self.config.ingest.window.clone()),
            BatchStore::new(self.store.clone()),
        )
    }

    /// Query service over the engine's store
    pub fn query_service(&self) -> QueryService {
        QueryService::new(BatchStore::new(self.store.clone()), self.detector())
            .with_scan_concurrency(self.config.service.scan_concurrency)
    }

    /// Ingest already discovered sources
    pub async fn ingest(&self, sources: &[Source]) -> Result<IngestReport> {
        self.pipeline().run(sources).await
    }

    /// Discover sources matching `pattern` and ingest them
    pub async fn ingest_pattern(&self, pattern: &str) -> Result<IngestReport> {
        let sources = source::discover(pattern)?;
        if sources.is_empty() {
            warn!("No files found for {}", pattern);
        } else {
            info!("Found {} measurement files for {}", sources.len(), pattern);
        }
        self.ingest(&sources).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = TrafficEngineBuilder::new().build().await.unwrap();
        assert_eq!(engine.store().name(), "memory");
        assert_eq!(engine.detector().threshold(), 3.0);

        let stats = engine.query_service().get_statistics().await.unwrap();
        assert_eq!(stats.total_records, 0);
    }

    #[tokio::test]
    async fn test_ingest_pattern_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TrafficEngineBuilder::new().build().await.unwrap();
        let report = engine
            .ingest_pattern(&format!("{}/*.csv", dir.path().display()))
            .await
            .unwrap();
        assert_eq!(report, IngestReport::default());
    }
}
