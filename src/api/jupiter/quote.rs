use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::api::serde_helpers::{decimal_from_string, field_as_string};
use crate::config::JupiterConfig;

/// Jupiter 支持的 swap 模式，本引擎只发起 ExactIn。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SwapMode {
    #[default]
    #[serde(rename = "ExactIn", alias = "exactIn")]
    ExactIn,
    #[serde(rename = "ExactOut", alias = "exactOut")]
    ExactOut,
}

impl SwapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapMode::ExactIn => "ExactIn",
            SwapMode::ExactOut => "ExactOut",
        }
    }
}

/// 报价参数中与具体请求无关的部分，来自 `[jupiter]` 配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteOptions {
    pub only_direct_routes: bool,
    pub restrict_intermediate_tokens: bool,
    pub max_accounts: u16,
    pub exclude_dexes: Vec<String>,
}

impl Default for QuoteOptions {
    fn default() -> Self {
        Self {
            only_direct_routes: true,
            restrict_intermediate_tokens: true,
            max_accounts: 24,
            exclude_dexes: vec!["Obric V2".to_string()],
        }
    }
}

impl From<&JupiterConfig> for QuoteOptions {
    fn from(config: &JupiterConfig) -> Self {
        Self {
            only_direct_routes: config.only_direct_routes,
            restrict_intermediate_tokens: config.restrict_intermediate_tokens,
            max_accounts: config.max_accounts,
            exclude_dexes: config.exclude_dexes.clone(),
        }
    }
}

/// `/quote` 请求，使用查询字符串传参。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
    pub swap_mode: SwapMode,
    pub options: QuoteOptions,
}

impl QuoteRequest {
    pub fn exact_in(
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount: u64,
        slippage_bps: u16,
        options: QuoteOptions,
    ) -> Self {
        Self {
            input_mint,
            output_mint,
            amount,
            slippage_bps,
            swap_mode: SwapMode::ExactIn,
            options,
        }
    }

    pub fn to_query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(10);
        params.push(("inputMint", self.input_mint.to_string()));
        params.push(("outputMint", self.output_mint.to_string()));
        params.push(("amount", self.amount.to_string()));
        params.push(("slippageBps", self.slippage_bps.to_string()));
        params.push(("swapMode", self.swap_mode.as_str().to_string()));
        params.push((
            "onlyDirectRoutes",
            self.options.only_direct_routes.to_string(),
        ));
        params.push((
            "restrictIntermediateTokens",
            self.options.restrict_intermediate_tokens.to_string(),
        ));
        params.push(("asLegacyTransaction", "false".to_string()));
        params.push(("maxAccounts", self.options.max_accounts.to_string()));
        let excluded: Vec<&str> = self
            .options
            .exclude_dexes
            .iter()
            .map(|dex| dex.trim())
            .filter(|dex| !dex.is_empty())
            .collect();
        if !excluded.is_empty() {
            params.push(("excludeDexes", excluded.join(",")));
        }
        params
    }
}

/// `/quote` 响应体中引擎关心的字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponsePayload {
    #[serde(with = "field_as_string")]
    pub input_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub output_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub in_amount: u64,
    #[serde(with = "field_as_string")]
    pub out_amount: u64,
    #[serde(with = "field_as_string")]
    pub other_amount_threshold: u64,
    #[serde(default)]
    pub swap_mode: SwapMode,
    pub slippage_bps: u16,
    #[serde(with = "decimal_from_string")]
    pub price_impact_pct: Decimal,
    #[serde(default)]
    pub context_slot: Option<u64>,
    #[serde(default)]
    pub route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    #[serde(default)]
    pub percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    #[serde(with = "field_as_string")]
    pub amm_key: Pubkey,
    #[serde(default)]
    pub label: Option<String>,
}

/// 报价响应：保留原始 JSON 以便原样回传给 `/swap`。
#[derive(Clone, Debug)]
pub struct QuoteResponse {
    raw: Value,
    data: QuoteResponsePayload,
}

impl QuoteResponse {
    pub fn try_from_value(value: Value) -> Result<Self, serde_json::Error> {
        let data: QuoteResponsePayload = serde_json::from_value(value.clone())?;
        Ok(Self { raw: value, data })
    }

    pub fn payload(&self) -> &QuoteResponsePayload {
        &self.data
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// `priceImpactPct` 为小数比例，乘 10000 得到 bps。
    pub fn price_impact_bps(&self) -> Decimal {
        self.data.price_impact_pct * Decimal::from(10_000)
    }

    /// 路由计划中的场所标签，按出现顺序去重。
    pub fn route_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for step in &self.data.route_plan {
            if let Some(label) = step.swap_info.label.as_ref() {
                if !labels.iter().any(|existing| existing == label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }
}
