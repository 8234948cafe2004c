use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RedisTierConfig {
    pub url: String,
    pub pool_size: u32,
}

impl Default for RedisTierConfig {
    fn default() -> Self {
        Self { url: "redis://localhost:6379".to_string(), pool_size: 10 }
    }
}

impl RedisTierConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("NEXUS_REDIS_URL").unwrap_or_else(|_| Self::default().url),
            pool_size: std::env::var("NEXUS_REDIS_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Optional distributed final-cache tier, shared across `nexus-api`
/// instances. Sits behind the in-process Final Cache: a miss there
/// checks here before falling through to the evaluator. Absent this
/// tier, every process has its own Final Cache and nothing is shared.
#[derive(Clone)]
pub struct RedisTier {
    manager: ConnectionManager,
}

impl RedisTier {
    pub async fn connect(config: RedisTierConfig) -> Result<Self> {
        let client = Client::open(config.url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: Option<usize>) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.manager.clone();

        if let Some(ttl) = ttl_seconds {
            conn.set_ex::<_, _, ()>(key, serialized, ttl as u64).await?;
        } else {
            conn.set::<_, _, ()>(key, serialized).await?;
        }

        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        match value {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    /// Deletes every key matching `pattern` — used by the invalidator
    /// to flush a whole tenant (`final:{tenant}:*`) on schema reload.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;
        conn.del::<_, ()>(keys).await?;
        Ok(count)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// Cache key for a quantized final-decision entry.
pub fn final_cache_key(tenant_id: &str, subject: &str, permission: &str, object: &str, quantum: i64) -> String {
    format!("final:{tenant_id}:{subject}:{permission}:{object}:{quantum}")
}
