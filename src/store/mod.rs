//! Key-value persistence for hour-window batches
//!
//! The backing store is treated as an opaque `get`/`set`/`keys` service.
//! [`BatchStore`] layers the batch key scheme and payload encoding on top.

use crate::error::{Result, TrafficError};
use crate::row::timestamp::{format_timestamp, KEY_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Batch encoding on top of a key-value store
pub mod batch;
/// In-process store
pub mod memory;
/// Redis-backed store
#[cfg(feature = "redis")]
pub mod redis;

pub use batch::{AbsentReason, BatchStore, KeyRead};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Minimal key-value contract the pipeline relies on
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value; `Ok(None)` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Every key currently stored
    async fn keys(&self) -> Result<Vec<String>>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "KeyValueStore"
    }
}

/// Store handle shared between ingestion and query sides
pub type SharedStore = Arc<dyn KeyValueStore>;

/// `(node_id, hour_window_start)`, rendered as `"<node> <YYYY-MM-DD HH:MM:SS>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Node identifier
    pub node_id: u64,
    /// Start of the hour window
    pub hour_window_start: NaiveDateTime,
}

impl StorageKey {
    /// Create a key
    pub fn new(node_id: u64, hour_window_start: NaiveDateTime) -> Self {
        Self {
            node_id,
            hour_window_start,
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.node_id, format_timestamp(&self.hour_window_start))
    }
}

impl FromStr for StorageKey {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self> {
        let (node, ts) = s
            .split_once(' ')
            .ok_or_else(|| TrafficError::Store(format!("not a batch key: {:?}", s)))?;
        let node_id = node
            .parse::<u64>()
            .map_err(|_| TrafficError::Store(format!("invalid node id in key {:?}", s)))?;
        let hour_window_start = NaiveDateTime::parse_from_str(ts, KEY_FORMAT)
            .map_err(|e| TrafficError::Store(format!("invalid timestamp in key {:?}: {}", s, e)))?;
        Ok(Self::new(node_id, hour_window_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_key_format() {
        let hour = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let key = StorageKey::new(7, hour);
        assert_eq!(key.to_string(), "7 2024-03-05 14:00:00");
        assert_eq!("7 2024-03-05 14:00:00".parse::<StorageKey>().unwrap(), key);
    }

    #[test]
    fn test_key_parse_rejects_foreign_keys() {
        assert!("summary".parse::<StorageKey>().is_err());
        assert!("x 2024-03-05 14:00:00".parse::<StorageKey>().is_err());
        assert!("7 yesterday".parse::<StorageKey>().is_err());
    }
}
