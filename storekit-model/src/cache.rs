use crate::Entity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storekit_types::EntityId;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors a cache proxy may report. Stores treat all of them as a degraded
/// cache, never as a failed operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Advisory single-entity cache keyed by id.
///
/// Never the source of truth. Implementations are shared across request
/// scopes and must tolerate concurrent calls.
#[async_trait]
pub trait CacheProxy<E: Entity>: Send + Sync {
    async fn get(&self, id: &EntityId) -> CacheResult<Option<E>>;

    async fn set(&self, id: &EntityId, entity: &E, ttl: Duration) -> CacheResult<()>;

    async fn invalidate(&self, id: &EntityId) -> CacheResult<()>;
}

/// Always misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl<E: Entity> CacheProxy<E> for NoCache {
    async fn get(&self, _id: &EntityId) -> CacheResult<Option<E>> {
        Ok(None)
    }

    async fn set(&self, _id: &EntityId, _entity: &E, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn invalidate(&self, _id: &EntityId) -> CacheResult<()> {
        Ok(())
    }
}

struct CachedEntry {
    json: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache holding serialized entities with per-entry expiry.
///
/// One instance can serve every entity type; entries are keyed by
/// `(entity type, id)`. When full, expired entries are purged first, then
/// the entry closest to expiry is evicted.
pub struct MemoryCache {
    entries: Mutex<HashMap<(&'static str, EntityId), CachedEntry>>,
    capacity: usize,
}

impl MemoryCache {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn lock(
        &self,
    ) -> CacheResult<std::sync::MutexGuard<'_, HashMap<(&'static str, EntityId), CachedEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".into()))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> CacheProxy<E> for MemoryCache {
    async fn get(&self, id: &EntityId) -> CacheResult<Option<E>> {
        let mut entries = self.lock()?;
        let key = (E::ENTITY_TYPE, *id);
        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            entries.remove(&key);
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(entry.json.clone())?))
    }

    async fn set(&self, id: &EntityId, entity: &E, ttl: Duration) -> CacheResult<()> {
        let json = serde_json::to_value(entity)?;
        let now = Instant::now();
        let mut entries = self.lock()?;
        let key = (E::ENTITY_TYPE, *id);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.capacity {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| *k);
                if let Some(k) = soonest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(
            key,
            CachedEntry {
                json,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, id: &EntityId) -> CacheResult<()> {
        self.lock()?.remove(&(E::ENTITY_TYPE, *id));
        Ok(())
    }
}
