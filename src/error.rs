//! Error types for the traffic ingestion and query pipeline

use thiserror::Error;

/// Main error type for traffic-rs operations
#[derive(Error, Debug)]
pub enum TrafficError {
    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A measurement source could not be read or parsed as a whole
    #[error("Source error: {0}")]
    Source(String),

    /// A single key-value store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// The key-value store could not serve any data at all
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Glob pattern compilation failed
    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    /// TOML configuration parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for traffic-rs operations
pub type Result<T> = std::result::Result<T, TrafficError>;

#[cfg(feature = "redis")]
impl From<redis::RedisError> for TrafficError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            TrafficError::StoreUnavailable(err.to_string())
        } else {
            TrafficError::Store(err.to_string())
        }
    }
}

impl TrafficError {
    /// Whether the error means the store as a whole cannot be reached
    pub fn is_outage(&self) -> bool {
        matches!(self, TrafficError::StoreUnavailable(_))
    }
}
