use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;

use super::alt::AltCache;
use super::freshness::{Fetcher, FreshnessCache, FreshnessError, FreshnessState};
use crate::config::CacheConfig;

/// 当前 slot 与最新 blockhash 的来源。
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn slot(&self) -> anyhow::Result<u64>;

    /// 返回 blockhash 及其最后有效区块高度。
    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)>;
}

#[async_trait]
impl LedgerSource for RpcClient {
    async fn slot(&self) -> anyhow::Result<u64> {
        self.get_slot_with_commitment(CommitmentConfig::confirmed())
            .await
            .context("获取当前 slot 失败")
    }

    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
        self.get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .context("获取最新 blockhash 失败")
    }
}

/// 组装交易所需的链上上下文：slot、blockhash 与世界 ALT。
#[derive(Clone, Debug)]
pub struct LedgerContext {
    slot: FreshnessCache<u64>,
    blockhash: FreshnessCache<(Hash, u64)>,
    world_alt: Option<FreshnessCache<AddressLookupTableAccount>>,
}

impl LedgerContext {
    pub fn new(
        source: Arc<dyn LedgerSource>,
        alts: AltCache,
        world_alt: Option<Pubkey>,
        config: &CacheConfig,
    ) -> Self {
        let slot_source = source.clone();
        let slot_fetcher: Fetcher<u64> = Arc::new(move || {
            let source = slot_source.clone();
            async move { source.slot().await }.boxed()
        });
        let blockhash_fetcher: Fetcher<(Hash, u64)> = Arc::new(move || {
            let source = source.clone();
            async move { source.latest_blockhash().await }.boxed()
        });
        let world_alt = world_alt.map(|key| {
            let fetcher: Fetcher<AddressLookupTableAccount> = Arc::new(move || {
                let alts = alts.clone();
                async move { Ok(alts.fetch_one(key).await?) }.boxed()
            });
            FreshnessCache::once("world_alt", fetcher)
        });

        Self {
            slot: FreshnessCache::new(
                "slot",
                slot_fetcher,
                Some(Duration::from_millis(config.slot_update_ms)),
                Some(Duration::from_millis(config.slot_expiry_ms)),
            ),
            blockhash: FreshnessCache::new(
                "blockhash",
                blockhash_fetcher,
                Some(Duration::from_millis(config.blockhash_update_ms)),
                Some(Duration::from_millis(config.blockhash_expiry_ms)),
            ),
            world_alt,
        }
    }

    pub async fn slot(&self) -> Result<u64, FreshnessError> {
        self.slot.get().await
    }

    pub async fn blockhash(&self) -> Result<(Hash, u64), FreshnessError> {
        self.blockhash.get().await
    }

    pub fn blockhash_state(&self) -> FreshnessState {
        self.blockhash.state()
    }

    /// 未配置世界 ALT 时返回 `Ok(None)`。
    pub async fn world_alt(&self) -> Result<Option<AddressLookupTableAccount>, FreshnessError> {
        match &self.world_alt {
            Some(cache) => cache.get().await.map(Some),
            None => Ok(None),
        }
    }
}
