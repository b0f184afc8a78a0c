//! 按指令名维护的优先费估计：最近一笔交易交给外部估算服务，结果做指数平滑。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeesConfig;

/// 优先费估算服务，返回每计算单元的微 lamports。
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate(&self, transaction_base64: &str) -> anyhow::Result<f64>;
}

/// Helius `getPriorityFeeEstimate`。
pub struct HeliusFeeEstimator {
    client: reqwest::Client,
    url: String,
}

impl HeliusFeeEstimator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<EstimateResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResult {
    priority_fee_estimate: Option<f64>,
}

#[async_trait]
impl FeeEstimator for HeliusFeeEstimator {
    async fn estimate(&self, transaction_base64: &str) -> anyhow::Result<f64> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": "getPriorityFeeEstimate",
            "params": [{
                "transaction": transaction_base64,
                "options": {
                    "priorityLevel": "High",
                    "includeVote": true,
                    "transactionEncoding": "base64",
                },
            }],
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("getPriorityFeeEstimate 返回状态 {status}");
        }
        let envelope: RpcEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            anyhow::bail!("getPriorityFeeEstimate 返回错误: {error}");
        }
        envelope
            .result
            .and_then(|result| result.priority_fee_estimate)
            .ok_or_else(|| anyhow::anyhow!("getPriorityFeeEstimate 缺少 priorityFeeEstimate"))
    }
}

#[derive(Debug, Clone)]
struct FeeEntry {
    micro_lamports: u64,
    last_updated: Option<Instant>,
    newest_tx: String,
    newest_tx_at: Instant,
}

pub struct PriorityFeeFeed {
    estimator: Arc<dyn FeeEstimator>,
    entries: Mutex<HashMap<String, FeeEntry>>,
    interval: Duration,
    beta: f64,
    default_micro_lamports: u64,
    max_micro_lamports: u64,
    window: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
}

impl PriorityFeeFeed {
    pub fn new(estimator: Arc<dyn FeeEstimator>, config: &FeesConfig) -> Self {
        Self {
            estimator,
            entries: Mutex::new(HashMap::new()),
            interval: Duration::from_millis(config.interval_ms),
            beta: config.beta,
            default_micro_lamports: config.default_micro_lamports,
            max_micro_lamports: config.max_micro_lamports,
            window: Duration::from_secs(config.window_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
            cancel: CancellationToken::new(),
        }
    }

    pub fn default_micro_lamports(&self) -> u64 {
        self.default_micro_lamports
    }

    /// 记录某指令最新构建的交易（base64），供下一轮估算使用。
    pub fn provide(&self, name: &str, transaction_base64: String) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.newest_tx = transaction_base64;
                entry.newest_tx_at = now;
            }
            None => {
                entries.insert(
                    name.to_string(),
                    FeeEntry {
                        micro_lamports: self.default_micro_lamports,
                        last_updated: None,
                        newest_tx: transaction_base64,
                        newest_tx_at: now,
                    },
                );
            }
        }
    }

    /// 未知指令或估值过旧时返回默认值。
    pub fn get_for(&self, name: &str) -> u64 {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(name) else {
            return self.default_micro_lamports;
        };
        match entry.last_updated {
            Some(at) if at.elapsed() > self.stale_after => self.default_micro_lamports,
            _ => entry.micro_lamports,
        }
    }

    /// 刷新一条最久未更新、且有新交易的条目；返回是否发起了估算。
    pub async fn tick(&self) -> bool {
        let candidate = {
            let entries = self.entries.lock();
            entries
                .iter()
                .filter(|(_, entry)| entry.newest_tx_at.elapsed() <= self.window)
                .filter(|(_, entry)| {
                    entry
                        .last_updated
                        .is_none_or(|updated| updated < entry.newest_tx_at)
                })
                .min_by_key(|(_, entry)| entry.last_updated)
                .map(|(name, entry)| (name.clone(), entry.newest_tx.clone()))
        };
        let Some((name, transaction)) = candidate else {
            return false;
        };

        match self.estimator.estimate(&transaction).await {
            Ok(estimate) => {
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.get_mut(&name) {
                    let previous = entry.micro_lamports;
                    entry.micro_lamports = smooth(
                        previous,
                        estimate,
                        self.beta,
                        self.max_micro_lamports,
                    );
                    entry.last_updated = Some(Instant::now());
                    debug!(
                        target: "fees",
                        instruction = %name,
                        estimate,
                        previous,
                        current = entry.micro_lamports,
                        "优先费已更新"
                    );
                }
            }
            Err(err) => {
                warn!(
                    target: "fees",
                    instruction = %name,
                    error = %err,
                    "优先费估算失败"
                );
            }
        }
        true
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(feed.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                target: "fees",
                interval_ms = feed.interval.as_millis() as u64,
                "优先费刷新循环启动"
            );
            loop {
                tokio::select! {
                    _ = feed.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        feed.tick().await;
                    }
                }
            }
            info!(target: "fees", "优先费刷新循环停止");
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// `floor(beta·old + (1−beta)·min(max, estimate))`。
fn smooth(previous: u64, estimate: f64, beta: f64, max: u64) -> u64 {
    let capped = estimate.max(0.0).min(max as f64);
    let value = beta * previous as f64 + (1.0 - beta) * capped;
    value.floor() as u64
}
