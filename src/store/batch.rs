use super::{SharedStore, StorageKey};
use crate::aggregation::Batch;
use crate::error::{Result, TrafficError};
use crate::row::TrafficRow;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

/// Why a key produced no batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    /// The key does not exist (anymore)
    Missing,
    /// The payload is not a batch
    Corrupt(String),
    /// The store failed to serve this key
    Unavailable(String),
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::Missing => f.write_str("missing"),
            AbsentReason::Corrupt(msg) => write!(f, "corrupt payload: {}", msg),
            AbsentReason::Unavailable(msg) => write!(f, "unavailable: {}", msg),
        }
    }
}

/// Result of reading one key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyRead {
    /// The key held a batch
    Batch(Vec<TrafficRow>),
    /// The key is treated as holding no data
    Absent(AbsentReason),
}

impl KeyRead {
    /// Rows of the batch, empty when absent
    pub fn into_rows(self) -> Vec<TrafficRow> {
        match self {
            KeyRead::Batch(rows) => rows,
            KeyRead::Absent(_) => Vec::new(),
        }
    }
}

/// Batch-level view over a key-value store
#[derive(Clone)]
pub struct BatchStore {
    inner: SharedStore,
}

impl BatchStore {
    /// Wrap a key-value store
    pub fn new(inner: SharedStore) -> Self {
        Self { inner }
    }

    /// Underlying store
    pub fn inner(&self) -> &SharedStore {
        &self.inner
    }

    /// Write a batch under its key, replacing any previous batch
    pub async fn put(&self, batch: &Batch) -> Result<StorageKey> {
        let key = batch.key();
        let payload = encode_rows(&batch.rows)?;
        self.inner.set(&key.to_string(), payload).await?;
        debug!(key = %key, rows = batch.rows.len(), "batch written");
        Ok(key)
    }

    /// Read one key; never fails, absence carries the reason
    pub async fn get(&self, key: &str) -> KeyRead {
        match self.inner.get(key).await {
            Ok(Some(payload)) => match decode_rows(&payload) {
                Ok(rows) => KeyRead::Batch(rows),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable batch");
                    KeyRead::Absent(AbsentReason::Corrupt(e.to_string()))
                }
            },
            Ok(None) => KeyRead::Absent(AbsentReason::Missing),
            Err(e) => {
                warn!(key = %key, error = %e, "store failed to serve key");
                KeyRead::Absent(AbsentReason::Unavailable(e.to_string()))
            }
        }
    }

    /// Every stored key
    pub async fn list_keys(&self) -> Result<BTreeSet<String>> {
        let keys = self.inner.keys().await.map_err(|e| match e {
            TrafficError::StoreUnavailable(msg) => TrafficError::StoreUnavailable(msg),
            other => TrafficError::StoreUnavailable(other.to_string()),
        })?;
        Ok(keys.into_iter().collect())
    }
}

/// Encode rows as the persisted JSON array
pub fn encode_rows(rows: &[TrafficRow]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(rows)?)
}

/// Decode a persisted JSON array of rows
pub fn decode_rows(payload: &[u8]) -> Result<Vec<TrafficRow>> {
    Ok(serde_json::from_slice(payload)?)
}
