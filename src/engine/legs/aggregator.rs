//! 经 USDC 中转的外部聚合器腿（AnyToUsdc / UsdcToAny）。

use std::sync::Arc;

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::api::jupiter::{AggregatorSource, QuoteOptions, QuoteRequest, QuoteResponse};
use crate::engine::step::{LegOutcome, StepResult};
use crate::engine::supersede::RequestSlot;
use crate::token::{TokenDescriptor, USDC_DECIMALS, USDC_MINT, from_raw_units};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorDirection {
    /// 任意代币 → USDC
    IntoUsdc,
    /// USDC → 任意代币
    OutOfUsdc,
}

/// 缓存键：相同参数的重复求值不会再次请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorKey {
    pub mint: Pubkey,
    pub amount: Decimal,
    pub slippage_bps: u16,
    pub refresh_generation: u64,
}

pub struct AggregatorLeg {
    direction: AggregatorDirection,
    source: Arc<dyn AggregatorSource>,
    options: QuoteOptions,
    slot: RequestSlot<AggregatorKey, LegOutcome>,
}

impl AggregatorLeg {
    pub fn new(
        direction: AggregatorDirection,
        source: Arc<dyn AggregatorSource>,
        options: QuoteOptions,
    ) -> Self {
        Self {
            direction,
            source,
            options,
            slot: RequestSlot::new(),
        }
    }

    /// `token` 是非 USDC 一侧的代币。
    pub async fn evaluate(
        &self,
        input: StepResult,
        token: &TokenDescriptor,
        slippage_bps: u16,
        refresh_generation: u64,
        enabled: bool,
    ) -> StepResult {
        if !enabled {
            return input;
        }
        let Some(amount) = input.amount else {
            return input;
        };
        let key = AggregatorKey {
            mint: token.mint,
            amount,
            slippage_bps,
            refresh_generation,
        };
        if let Some(cached) = self.slot.lookup(&key) {
            debug!(
                target: "engine::legs",
                direction = ?self.direction,
                mint = %token.mint,
                "聚合器报价命中缓存"
            );
            return input.advance(cached);
        }

        let ticket = self.slot.begin();
        let result = self.fetch(token, amount, slippage_bps).await;
        let outcome = match result {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return input.dead(),
            Err(err) => {
                if self.slot.is_current(ticket) {
                    warn!(
                        target: "engine::legs",
                        direction = ?self.direction,
                        mint = %token.mint,
                        error = %err.describe(),
                        "聚合器报价失败"
                    );
                }
                return input.dead();
            }
        };

        if !self.slot.publish(ticket, key, outcome.clone()) {
            debug!(
                target: "engine::legs",
                direction = ?self.direction,
                request_id = ticket.id(),
                "丢弃过期的聚合器报价"
            );
            return input.dead();
        }
        input.advance(outcome)
    }

    /// `Ok(None)` 表示数量无法换算成原始单位。
    async fn fetch(
        &self,
        token: &TokenDescriptor,
        amount: Decimal,
        slippage_bps: u16,
    ) -> Result<Option<LegOutcome>, crate::api::jupiter::JupiterError> {
        let (input_mint, output_mint, input_decimals, output_decimals) = match self.direction {
            AggregatorDirection::IntoUsdc => {
                (token.mint, USDC_MINT, token.decimals, USDC_DECIMALS)
            }
            AggregatorDirection::OutOfUsdc => {
                (USDC_MINT, token.mint, USDC_DECIMALS, token.decimals)
            }
        };
        let Some(raw_amount) = crate::token::to_raw_units(amount, input_decimals) else {
            return Ok(None);
        };
        if raw_amount == 0 {
            return Ok(None);
        }

        let request = QuoteRequest::exact_in(
            input_mint,
            output_mint,
            raw_amount,
            slippage_bps,
            self.options.clone(),
        );
        let mints = [token.mint];
        let (quote, prices) =
            tokio::join!(self.source.quote(&request), self.source.prices(&mints));
        let quote = quote?;
        // 价格只影响美元估值，取不到时报价照常
        let unit_price = match prices {
            Ok(prices) => prices.get(&token.mint).copied(),
            Err(err) => {
                warn!(
                    target: "engine::legs",
                    mint = %token.mint,
                    error = %err.describe(),
                    "获取美元价格失败"
                );
                None
            }
        };

        let Some(output) = from_raw_units(quote.payload().out_amount, output_decimals) else {
            return Ok(None);
        };
        if output.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.outcome(amount, output, unit_price, quote)))
    }

    fn outcome(
        &self,
        input_amount: Decimal,
        output: Decimal,
        unit_price: Option<Decimal>,
        quote: QuoteResponse,
    ) -> LegOutcome {
        let value = |amount: Decimal| unit_price.and_then(|price| amount.checked_mul(price));
        let (input_usd, output_usd) = match self.direction {
            AggregatorDirection::IntoUsdc => (value(input_amount), Some(output)),
            AggregatorDirection::OutOfUsdc => (Some(input_amount), value(output)),
        };
        let venues = quote.route_labels();
        LegOutcome {
            amount: output,
            price_impact_bps: quote.price_impact_bps(),
            input_usd,
            output_usd,
            world_reserves: None,
            aggregator_quote: Some(Arc::new(quote)),
            venues,
        }
    }
}
