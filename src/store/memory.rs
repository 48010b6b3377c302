use super::KeyValueStore;
use crate::error::{Result, TrafficError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process key-value store
///
/// Used by tests and by single-process deployments that do not need
/// persistence. `set_available(false)` simulates an outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(TrafficError::StoreUnavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check()?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
