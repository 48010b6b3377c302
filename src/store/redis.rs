use super::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

/// Redis-backed key-value store
///
/// Batches are plain string values; key discovery uses `KEYS *`, matching how
/// the stored windows are enumerated.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("*").await?;
        Ok(keys)
    }

    fn name(&self) -> &str {
        "redis"
    }
}
