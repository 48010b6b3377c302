//! File-based configuration
//!
//! ```toml
//! [store]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//!
//! [ingest]
//! pattern = "telecom10k/*"
//! cutoff = "2023-12-25 00:00:00"
//!
//! [anomaly]
//! threshold = 3.0
//! deviation = "sample"
//!
//! [service]
//! http_port = 8000
//! ```

use crate::aggregation::WindowConfig;
use crate::anomaly::{Deviation, DEFAULT_THRESHOLD};
use crate::error::{Result, TrafficError};
use crate::query::DEFAULT_SCAN_CONCURRENCY;
use crate::row::timestamp::{format_timestamp, KEY_FORMAT};
use crate::row::{normalize::default_cutoff, RetentionPolicy};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Key-value backend
    #[serde(default)]
    pub store: StoreConfig,
    /// Ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Anomaly scoring settings
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    /// HTTP service settings
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Which key-value store to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process, lost on exit
    #[default]
    Memory,
    /// Redis server
    Redis,
}

/// Key-value store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL for the Redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Glob pattern of measurement files
    #[serde(default)]
    pub pattern: Option<String>,
    /// Sessions must start after this instant (`YYYY-MM-DD HH:MM:SS`)
    #[serde(default = "default_cutoff_text")]
    pub cutoff: String,
    /// Drop sessions that already ended
    #[serde(default = "default_true")]
    pub open_sessions_only: bool,
    /// Window geometry
    #[serde(flatten)]
    pub window: WindowConfig,
}

/// Anomaly scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Multiplier `k` of the standard deviation
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Deviation estimator
    #[serde(default)]
    pub deviation: Deviation,
}

/// HTTP service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listening port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Keys read concurrently per query
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum in-flight requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            cutoff: default_cutoff_text(),
            open_sessions_only: true,
            window: WindowConfig::default(),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            deviation: Deviation::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            scan_concurrency: default_scan_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}
fn default_cutoff_text() -> String {
    format_timestamp(&default_cutoff())
}
fn default_true() -> bool {
    true
}
fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_http_port() -> u16 {
    8000
}
fn default_scan_concurrency() -> usize {
    DEFAULT_SCAN_CONCURRENCY
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_requests() -> usize {
    1000
}

impl IngestConfig {
    /// Parsed cutoff instant
    pub fn cutoff(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.cutoff.trim(), KEY_FORMAT).map_err(|e| {
            TrafficError::Config(format!("invalid ingest.cutoff {:?}: {}", self.cutoff, e))
        })
    }

    /// Retention policy described by this section
    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        Ok(RetentionPolicy {
            cutoff: self.cutoff()?,
            open_sessions_only: self.open_sessions_only,
        })
    }
}

impl TrafficConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TrafficConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        self.ingest.window.validate()?;
        self.ingest.cutoff()?;
        if !self.anomaly.threshold.is_finite() || self.anomaly.threshold < 0.0 {
            return Err(TrafficError::Config(format!(
                "anomaly.threshold must be a non-negative number (got {})",
                self.anomaly.threshold
            )));
        }
        if self.service.scan_concurrency == 0 {
            return Err(TrafficError::Config(
                "service.scan_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TrafficConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrafficConfig::default());
        assert_eq!(config.anomaly.threshold, 3.0);
        assert_eq!(config.ingest.window.slots_per_hour, 6);
        assert_eq!(config.ingest.cutoff, "2023-12-25 00:00:00");
        assert_eq!(config.service.http_port, 8000);
    }

    #[test]
    fn test_full_document() {
        let config = TrafficConfig::from_toml_str(
            r#"
            [store]
            backend = "redis"
            redis_url = "redis://cache:6379/2"

            [ingest]
            pattern = "data/*"
            cutoff = "2024-01-01 00:00:00"
            sub_window_minutes = 5
            slots_per_hour = 12

            [anomaly]
            threshold = 2.5
            deviation = "population"

            [service]
            http_port = 9000
            scan_concurrency = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://cache:6379/2");
        assert_eq!(config.ingest.pattern.as_deref(), Some("data/*"));
        assert_eq!(config.ingest.window.sub_window_minutes, 5);
        assert_eq!(config.ingest.window.slots_per_hour, 12);
        assert_eq!(config.anomaly.deviation, Deviation::Population);
        assert_eq!(config.service.scan_concurrency, 4);
        assert_eq!(config.service.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(TrafficConfig::from_toml_str("[ingest]\ncutoff = \"soon\"").is_err());
        assert!(TrafficConfig::from_toml_str("[anomaly]\nthreshold = -1.0").is_err());
        assert!(TrafficConfig::from_toml_str("[ingest]\nslots_per_hour = 0").is_err());
        assert!(TrafficConfig::from_toml_str("[ingest]\nslots_per_hour = 7").is_err());
        assert!(TrafficConfig::from_toml_str(
            "[ingest]\nsub_window_minutes = 9223372036854775807"
        )
        .is_err());
        assert!(TrafficConfig::from_toml_str("[store]\nbackend = \"etcd\"").is_err());
    }
}
