//! Time-boxed key/value cache for serialized reference data

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Byte cache with absolute expiration per entry
#[async_trait]
pub trait Cache: Send + Sync {
    /// Cached bytes for `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous entry
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Return the cached value for `key`, or run `producer`, cache its result as JSON and return it.
///
/// Producer errors are returned and nothing is cached. Entries that no longer
/// deserialize as `T` are treated as misses.
pub async fn get_or_populate<T, F, Fut>(
    cache: &dyn Cache,
    key: &str,
    ttl: Duration,
    producer: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(bytes) = cache.get(key).await {
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                log::debug!("Cache hit for {}", key);
                return Ok(value);
            }
            Err(e) => log::warn!("Discarding unreadable cache entry {}: {}", key, e),
        }
    }

    log::debug!("Cache miss for {}", key);
    let value = producer().await?;
    match serde_json::to_vec(&value) {
        Ok(bytes) => cache.set(key, bytes, ttl).await,
        Err(e) => log::warn!("Failed to cache {}: {}", key, e),
    }
    Ok(value)
}
