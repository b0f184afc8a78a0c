use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use super::{JupiterError, QuoteResponse};
use crate::api::serde_helpers::field_as_string;

/// `/swap` 请求体。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[serde(with = "field_as_string")]
    pub user_public_key: Pubkey,
    pub quote_response: Value,
    pub wrap_and_unwrap_sol: bool,
    pub as_legacy_transaction: bool,
    pub dynamic_compute_unit_limit: bool,
}

impl SwapRequest {
    /// 组装要求：不自动包裹 SOL、v0 交易、动态 CU。
    pub fn for_composition(user: Pubkey, quote: &QuoteResponse) -> Self {
        Self {
            user_public_key: user,
            quote_response: quote.raw().clone(),
            wrap_and_unwrap_sol: false,
            as_legacy_transaction: false,
            dynamic_compute_unit_limit: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionResponse {
    /// base64 编码的未签名 v0 交易
    pub swap_transaction: String,
    pub last_valid_block_height: u64,
    #[serde(default)]
    pub prioritization_fee_lamports: Option<u64>,
    #[serde(default)]
    pub compute_unit_limit: Option<u32>,
}

/// 聚合器交易构建服务。
#[async_trait]
pub trait SwapBuilder: Send + Sync {
    async fn build_swap(
        &self,
        user: &Pubkey,
        quote: &QuoteResponse,
    ) -> Result<SwapTransactionResponse, JupiterError>;
}
