use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{Level, debug, warn};

use super::{Cache, InMemoryBackend};
use crate::monitoring::{LatencyMetadata, measure_future};

const ACCOUNT_BATCH_LIMIT: usize = 100;

/// 账户原始数据来源，结果与请求顺序一一对应，不存在的账户为 `None`。
#[async_trait]
pub trait AccountDataSource: Send + Sync {
    async fn get_multiple(&self, keys: &[Pubkey]) -> anyhow::Result<Vec<Option<Vec<u8>>>>;
}

#[async_trait]
impl AccountDataSource for RpcClient {
    async fn get_multiple(&self, keys: &[Pubkey]) -> anyhow::Result<Vec<Option<Vec<u8>>>> {
        let mut collected = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(ACCOUNT_BATCH_LIMIT) {
            match self.get_multiple_accounts(chunk).await {
                Ok(accounts) => {
                    collected.extend(accounts.into_iter().map(|account| account.map(|a| a.data)));
                }
                Err(err) => {
                    warn!(
                        target: "cache::alt",
                        error = %err,
                        count = chunk.len(),
                        "批量拉取账户失败，尝试逐条回退"
                    );
                    for address in chunk {
                        let account = self
                            .get_account(address)
                            .await
                            .with_context(|| format!("逐条拉取账户失败: {address}"))?;
                        collected.push(Some(account.data));
                    }
                }
            }
        }
        Ok(collected)
    }
}

#[derive(Debug, Error)]
pub enum AltError {
    #[error("找不到地址查找表 {table}")]
    NotFound { table: Pubkey },
    #[error("反序列化地址查找表 {table} 失败: {message}")]
    Decode { table: Pubkey, message: String },
    #[error("拉取地址查找表失败: {0:#}")]
    Fetch(#[from] anyhow::Error),
}

/// 带 TTL 的 ALT 缓存，未命中的表一次批量回源。
#[derive(Clone)]
pub struct AltCache {
    source: Arc<dyn AccountDataSource>,
    inner: Arc<Cache<InMemoryBackend<Pubkey, AddressLookupTableAccount>>>,
    ttl: Duration,
}

impl AltCache {
    pub fn new(source: Arc<dyn AccountDataSource>, ttl: Duration) -> Self {
        Self {
            source,
            inner: Arc::new(Cache::default()),
            ttl,
        }
    }

    pub async fn fetch_one(&self, key: Pubkey) -> Result<AddressLookupTableAccount, AltError> {
        let mut tables = self.fetch_many(&[key]).await?;
        tables.pop().ok_or(AltError::NotFound { table: key })
    }

    /// 按请求顺序返回；任何一张表缺失都视为错误。
    pub async fn fetch_many(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>, AltError> {
        let mut resolved: HashMap<Pubkey, AddressLookupTableAccount> = HashMap::new();
        let mut missing = Vec::new();
        for key in keys {
            if resolved.contains_key(key) || missing.contains(key) {
                continue;
            }
            match self.inner.get(key).await {
                Some(hit) => {
                    resolved.insert(*key, (*hit).clone());
                }
                None => missing.push(*key),
            }
        }

        if !missing.is_empty() {
            debug!(
                target: "cache::alt",
                count = missing.len(),
                "ALT 缓存未命中，回源拉取"
            );
            let metadata = LatencyMetadata::from_pairs([("count", missing.len().to_string())]);
            let accounts = measure_future(
                "alt_fetch",
                Level::DEBUG,
                metadata,
                self.source.get_multiple(&missing),
            )
            .await?;
            for (index, key) in missing.iter().enumerate() {
                let Some(Some(data)) = accounts.get(index) else {
                    warn!(target: "cache::alt", table = %key, "ALT 账户不存在");
                    self.inner.remove(key).await;
                    return Err(AltError::NotFound { table: *key });
                };
                let table = decode_lookup_table(key, data)?;
                self.inner.insert(*key, table.clone(), Some(self.ttl)).await;
                resolved.insert(*key, table);
            }
        }

        keys.iter()
            .map(|key| {
                resolved
                    .get(key)
                    .cloned()
                    .ok_or(AltError::NotFound { table: *key })
            })
            .collect()
    }
}

pub fn decode_lookup_table(
    address: &Pubkey,
    data: &[u8],
) -> Result<AddressLookupTableAccount, AltError> {
    AddressLookupTable::deserialize(data)
        .map(|table| AddressLookupTableAccount {
            key: *address,
            addresses: table.addresses.into_owned(),
        })
        .map_err(|err| {
            warn!(
                target: "cache::alt",
                address = %address,
                error = %err,
                "反序列化 ALT 失败"
            );
            AltError::Decode {
                table: *address,
                message: err.to_string(),
            }
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    const META_SIZE: usize = 56;

    /// 构造链上格式的查找表账户数据：56 字节元数据 + 地址列表。
    pub(crate) fn encode_table(addresses: &[Pubkey]) -> Vec<u8> {
        let mut data = vec![0u8; META_SIZE];
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4..12].copy_from_slice(&u64::MAX.to_le_bytes());
        for address in addresses {
            data.extend_from_slice(address.as_ref());
        }
        data
    }

    #[derive(Default)]
    pub(crate) struct FakeAccounts {
        accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
        pub requests: AtomicUsize,
    }

    impl FakeAccounts {
        pub(crate) fn put(&self, key: Pubkey, data: Vec<u8>) {
            self.accounts.lock().insert(key, data);
        }
    }

    #[async_trait]
    impl AccountDataSource for FakeAccounts {
        async fn get_multiple(&self, keys: &[Pubkey]) -> anyhow::Result<Vec<Option<Vec<u8>>>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let accounts = self.accounts.lock();
            Ok(keys.iter().map(|key| accounts.get(key).cloned()).collect())
        }
    }

    #[tokio::test]
    async fn fetch_many_preserves_order_and_caches() {
        let source = Arc::new(FakeAccounts::default());
        let first = Pubkey::new_unique();
        let second = Pubkey::new_unique();
        let entry = Pubkey::new_unique();
        source.put(first, encode_table(&[entry]));
        source.put(second, encode_table(&[]));
        let cache = AltCache::new(source.clone(), Duration::from_secs(300));

        let tables = cache.fetch_many(&[second, first]).await.unwrap();
        assert_eq!(tables[0].key, second);
        assert_eq!(tables[1].addresses, vec![entry]);

        let _ = cache.fetch_many(&[first, second]).await.unwrap();
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let source = Arc::new(FakeAccounts::default());
        let present = Pubkey::new_unique();
        source.put(present, encode_table(&[]));
        let absent = Pubkey::new_unique();
        let cache = AltCache::new(source, Duration::from_secs(300));

        let err = cache.fetch_many(&[present, absent]).await.unwrap_err();
        assert!(matches!(err, AltError::NotFound { table } if table == absent));
    }

    #[test]
    fn garbage_data_fails_to_decode() {
        let key = Pubkey::new_unique();
        let err = decode_lookup_table(&key, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, AltError::Decode { .. }));
    }
}
