use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::pubkey::Pubkey;

use crate::token::TokenDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub ivy: IvyConfig,
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    /// `[[tokens]]`：额外的代币描述符，补充内置 USDC / SOL / IVY。
    #[serde(default)]
    pub tokens: Vec<TokenDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "super::default_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoggingProfile {
    Lean,
    Verbose,
}

impl Default for LoggingProfile {
    fn default() -> Self {
        Self::Lean
    }
}

impl LoggingProfile {
    pub fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }

    /// 外部调用耗时日志级别。
    pub fn latency_level(self) -> tracing::Level {
        if self.is_verbose() {
            tracing::Level::INFO
        } else {
            tracing::Level::DEBUG
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "super::default_logging_profile")]
    pub profile: LoggingProfile,
    #[serde(default = "super::default_slow_quote_warn_ms")]
    pub slow_quote_warn_ms: u64,
    #[serde(default = "super::default_slow_swap_warn_ms")]
    pub slow_swap_warn_ms: u64,
}

/// `[ivy]`：链上程序与组装交易所需的固定账户。
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct IvyConfig {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub program_id: Option<Pubkey>,
    /// 世界 ALT，纯 IVY 路线组装时使用
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub world_alt: Option<Pubkey>,
    #[serde(default)]
    pub placeholder: PlaceholderConfig,
    #[serde(default)]
    pub compute_units: ComputeUnitConfig,
}

/// 输出端聚合器腿以该大额 USDC 持有者身份构建，再替换为调用方。
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceholderConfig {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "super::default_placeholder_owner")]
    pub owner: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "super::default_placeholder_wsol_account")]
    pub wsol_account: Pubkey,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ComputeUnitConfig {
    #[serde(default = "super::default_ivy_only_compute_units")]
    pub ivy_only: u32,
    #[serde(default = "super::default_with_game_compute_units")]
    pub with_game: u32,
}

/// `[jupiter]`：报价 / 构建 / 价格三个端点与报价参数。
#[derive(Debug, Clone, Deserialize)]
pub struct JupiterConfig {
    #[serde(default = "super::default_jupiter_quote_url")]
    pub quote_url: String,
    #[serde(default = "super::default_jupiter_swap_url")]
    pub swap_url: String,
    #[serde(default = "super::default_jupiter_price_url")]
    pub price_url: String,
    #[serde(default = "super::default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    #[serde(default = "super::default_swap_timeout_ms")]
    pub swap_timeout_ms: u64,
    #[serde(default = "super::default_price_timeout_ms")]
    pub price_timeout_ms: u64,
    #[serde(default = "super::default_max_accounts")]
    pub max_accounts: u16,
    #[serde(default = "super::default_exclude_dexes")]
    pub exclude_dexes: Vec<String>,
    #[serde(default = "super::default_true")]
    pub only_direct_routes: bool,
    #[serde(default = "super::default_true")]
    pub restrict_intermediate_tokens: bool,
}

/// `[fees]`：优先费 EMA 跟踪。
#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    #[serde(default)]
    pub helius_rpc_url: Option<String>,
    #[serde(default = "super::default_fee_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "super::default_fee_beta")]
    pub beta: f64,
    #[serde(default = "super::default_priority_fee")]
    pub default_micro_lamports: u64,
    #[serde(default = "super::default_max_priority_fee")]
    pub max_micro_lamports: u64,
    #[serde(default = "super::default_fee_window_secs")]
    pub window_secs: u64,
    #[serde(default = "super::default_fee_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// `[cache]`：更新间隔与过期时间，单位毫秒。
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "super::default_slot_update_ms")]
    pub slot_update_ms: u64,
    #[serde(default = "super::default_slot_expiry_ms")]
    pub slot_expiry_ms: u64,
    #[serde(default = "super::default_blockhash_update_ms")]
    pub blockhash_update_ms: u64,
    #[serde(default = "super::default_blockhash_expiry_ms")]
    pub blockhash_expiry_ms: u64,
    #[serde(default = "super::default_alt_ttl_secs")]
    pub alt_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "super::default_prometheus_listen")]
    pub listen: String,
}
