//! 缓存层：通用 TTL 缓存、新鲜度缓存、链上上下文与 ALT / ATA。

pub mod alt;
pub mod ata;
pub mod freshness;
pub mod ledger;

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

pub use alt::{AltCache, AltError};
pub use ata::associated_token_address;
pub use freshness::FreshnessError;
pub use ledger::LedgerContext;

/// 缓存后端抽象，`get` 不返回已过期条目。
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Send + Sync + 'static;

    async fn get(&self, key: &Self::Key) -> Option<Arc<Self::Value>>;

    async fn insert(&self, key: Self::Key, value: Arc<Self::Value>, ttl: Option<Duration>);

    async fn remove(&self, key: &Self::Key);
}

pub struct Cache<B>
where
    B: CacheBackend,
{
    backend: B,
}

impl<B> Default for Cache<B>
where
    B: CacheBackend + Default,
{
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B> Cache<B>
where
    B: CacheBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn get(&self, key: &B::Key) -> Option<Arc<B::Value>> {
        self.backend.get(key).await
    }

    pub async fn insert(&self, key: B::Key, value: B::Value, ttl: Option<Duration>) {
        self.backend.insert(key, Arc::new(value), ttl).await;
    }

    pub async fn remove(&self, key: &B::Key) {
        self.backend.remove(key).await;
    }
}

/// DashMap 内存后端，过期条目在读取时淘汰。
pub struct InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> Default for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

struct Entry<V> {
    value: Arc<V>,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

#[async_trait]
impl<K, V> CacheBackend for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn get(&self, key: &Self::Key) -> Option<Arc<Self::Value>> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(Instant::now()) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    async fn insert(&self, key: Self::Key, value: Arc<Self::Value>, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key, entry);
    }

    async fn remove(&self, key: &Self::Key) {
        self.entries.remove(key);
    }
}
