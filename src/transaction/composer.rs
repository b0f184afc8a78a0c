//! 交易组装：直接指令、聚合器直连与拼接三种形态。

use std::sync::Arc;

use rust_decimal::Decimal;
use solana_message::CompileError;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::message::{
    InstructionExtractionError, compile_unsigned_v0, extract_instructions, lookup_table_keys,
};
use super::substitution::{PlaceholderIdentity, transform_placeholder};
use super::wire::{WireError, decode_aggregator_transaction, encode_transaction};
use crate::api::jupiter::{JupiterError, QuoteResponse, SwapBuilder};
use crate::cache::{AltCache, AltError, FreshnessError, LedgerContext};
use crate::config::ComputeUnitConfig;
use crate::fees::PriorityFeeFeed;
use crate::instructions::compute_budget::{
    bump_compute_unit_limit, compute_unit_price_instruction, has_compute_unit_price,
};
use crate::instructions::ivy::{GameAddresses, IvyInstructionError, IvyProgram};
use crate::instructions::token::is_jupiter_route;
use crate::monitoring::record_compose_outcome;
use crate::route::RouteShape;
use crate::token::TokenDescriptor;

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("找不到聚合器路由指令")]
    MissingRouteInstruction,
    #[error("找不到地址查找表 {table}")]
    MissingLookupTable { table: Pubkey },
    #[error("未配置 {purpose} 地址查找表")]
    LookupTableNotConfigured { purpose: &'static str },
    #[error(transparent)]
    Extraction(#[from] InstructionExtractionError),
    #[error("{instruction} 需要聚合器报价")]
    MissingAggregatorQuote { instruction: &'static str },
    #[error("{instruction} 需要游戏账户")]
    MissingGame { instruction: &'static str },
    #[error(transparent)]
    Instruction(#[from] IvyInstructionError),
    #[error("数量 {amount} 无法换算为 {symbol} 的原始单位")]
    AmountOutOfRange { amount: Decimal, symbol: String },
    #[error("路线形态 {shape:?} 无法组装为单笔交易")]
    UnsupportedRoute { shape: RouteShape },
    #[error("聚合器构建交易失败: {0}")]
    Build(#[from] JupiterError),
    #[error(transparent)]
    Ledger(#[from] FreshnessError),
    #[error("拉取地址查找表失败: {0}")]
    LookupTableFetch(AltError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("编译 v0 消息失败: {0}")]
    Compile(#[from] CompileError),
}

impl From<AltError> for CompositionError {
    fn from(err: AltError) -> Self {
        match err {
            AltError::NotFound { table } => CompositionError::MissingLookupTable { table },
            other => CompositionError::LookupTableFetch(other),
        }
    }
}

impl CompositionError {
    /// 不变量被破坏，重试不会改变结果。
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            CompositionError::MissingRouteInstruction
            | CompositionError::MissingLookupTable { .. }
            | CompositionError::LookupTableNotConfigured { .. }
            | CompositionError::Extraction(_)
            | CompositionError::MissingAggregatorQuote { .. }
            | CompositionError::MissingGame { .. }
            | CompositionError::UnsupportedRoute { .. } => true,
            CompositionError::Instruction(err) => {
                matches!(err, IvyInstructionError::GameAddress { .. })
            }
            _ => false,
        }
    }
}

/// 目标游戏及其兑换 ALT。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTarget {
    pub address: Pubkey,
    pub swap_alt: Option<Pubkey>,
}

#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub caller: Pubkey,
    pub shape: RouteShape,
    pub game: Option<GameTarget>,
    pub input: TokenDescriptor,
    pub output: TokenDescriptor,
    pub input_amount: Decimal,
    pub min_output_amount: Decimal,
    pub aggregator_quote: Option<Arc<QuoteResponse>>,
}

#[derive(Debug, Clone)]
pub struct ComposedTransaction {
    pub transaction: VersionedTransaction,
    pub last_valid_block_height: u64,
    /// 组装时的确认 slot，RPC 不可用时为空
    pub context_slot: Option<u64>,
    pub instruction: &'static str,
}

struct RawAmounts {
    input: u64,
    min_output: u64,
}

pub struct TransactionComposer {
    builder: Arc<dyn SwapBuilder>,
    alts: AltCache,
    ledger: LedgerContext,
    fees: Arc<PriorityFeeFeed>,
    program: IvyProgram,
    placeholder: PlaceholderIdentity,
    compute_units: ComputeUnitConfig,
}

impl TransactionComposer {
    pub fn new(
        builder: Arc<dyn SwapBuilder>,
        alts: AltCache,
        ledger: LedgerContext,
        fees: Arc<PriorityFeeFeed>,
        program: IvyProgram,
        placeholder: PlaceholderIdentity,
        compute_units: ComputeUnitConfig,
    ) -> Self {
        Self {
            builder,
            alts,
            ledger,
            fees,
            program,
            placeholder,
            compute_units,
        }
    }

    pub async fn compose(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, CompositionError> {
        let started = Instant::now();
        let instruction = request.shape.instruction_name();
        let (result, slot) = tokio::join!(self.compose_shape(request), self.ledger.slot());
        let context_slot = match slot {
            Ok(slot) => Some(slot),
            Err(err) => {
                debug!(target: "transaction::composer", error = %err, "获取 slot 失败");
                None
            }
        };
        let result = result.map(|composed| ComposedTransaction {
            context_slot,
            ..composed
        });
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        record_compose_outcome(instruction, result.is_ok(), elapsed_ms);

        match &result {
            Ok(composed) => info!(
                target: "transaction::composer",
                instruction,
                caller = %request.caller,
                last_valid_block_height = composed.last_valid_block_height,
                slot = ?composed.context_slot,
                elapsed_ms = format_args!("{elapsed_ms:.1}"),
                "交易组装完成"
            ),
            Err(err) => warn!(
                target: "transaction::composer",
                instruction,
                caller = %request.caller,
                invariant = err.is_invariant_violation(),
                error = %err,
                "交易组装失败"
            ),
        }
        result
    }

    async fn compose_shape(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, CompositionError> {
        match request.shape {
            RouteShape::Unsupported => Err(CompositionError::UnsupportedRoute {
                shape: request.shape,
            }),
            RouteShape::JupiterSwap => self.compose_aggregator_only(request).await,
            shape if shape.is_spliced() => self.compose_spliced(request).await,
            _ => self.compose_direct(request).await,
        }
    }

    async fn compose_aggregator_only(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, CompositionError> {
        let instruction = request.shape.instruction_name();
        let quote = require_quote(request)?;
        let response = self.builder.build_swap(&request.caller, quote).await?;
        let transaction = decode_aggregator_transaction(&response.swap_transaction)?;
        Ok(ComposedTransaction {
            transaction,
            last_valid_block_height: response.last_valid_block_height,
            context_slot: None,
            instruction,
        })
    }

    async fn compose_direct(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, CompositionError> {
        let instruction = request.shape.instruction_name();
        let amounts = raw_amounts(request)?;
        let caller = &request.caller;

        let program_ix = match request.shape {
            RouteShape::GameSwap { is_buy } => {
                let game = self.game_addresses(request)?;
                self.program
                    .game_swap(&game, caller, amounts.input, amounts.min_output, is_buy)?
            }
            RouteShape::WorldSwap { is_buy } => {
                self.program
                    .world_swap(caller, amounts.input, amounts.min_output, is_buy)?
            }
            RouteShape::MixUsdcToGame => {
                let game = self.game_addresses(request)?;
                self.program
                    .mix_usdc_to_game(&game, caller, amounts.input, amounts.min_output)?
            }
            RouteShape::MixGameToUsdc => {
                let game = self.game_addresses(request)?;
                self.program
                    .mix_game_to_usdc(&game, caller, amounts.input, amounts.min_output)?
            }
            shape => return Err(CompositionError::UnsupportedRoute { shape }),
        };

        let instructions = vec![
            compute_unit_price_instruction(self.fees.get_for(instruction)),
            program_ix,
        ];
        let tables = self.optional_tables(request).await?;
        debug!(
            target: "transaction::composer",
            instruction,
            blockhash_state = ?self.ledger.blockhash_state(),
            "读取 blockhash"
        );
        let (blockhash, last_valid_block_height) = self.ledger.blockhash().await?;
        let transaction = compile_unsigned_v0(caller, &instructions, &tables, blockhash)?;
        self.report(instruction, &transaction)?;

        Ok(ComposedTransaction {
            transaction,
            last_valid_block_height,
            context_slot: None,
            instruction,
        })
    }

    async fn compose_spliced(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, CompositionError> {
        let shape = request.shape;
        let instruction = shape.instruction_name();
        let amounts = raw_amounts(request)?;
        let caller = request.caller;
        let quote = require_quote(request)?;

        let builder_user = if shape.uses_placeholder() {
            self.placeholder.owner
        } else {
            caller
        };
        let response = self.builder.build_swap(&builder_user, quote).await?;
        let built = decode_aggregator_transaction(&response.swap_transaction)?;
        let blockhash = *built.message.recent_blockhash();

        let mut table_keys = lookup_table_keys(&built.message);
        let jupiter_table_count = table_keys.len();
        table_keys.push(self.required_table_key(request).await?);
        let tables = self.alts.fetch_many(&table_keys).await?;

        let mut instructions =
            extract_instructions(&built.message, Some(&tables[..jupiter_table_count]))?;
        if shape.uses_placeholder() {
            let rewrite = transform_placeholder(
                instructions,
                &self.placeholder,
                &caller,
                &request.output.mint,
            )
            .ok_or(CompositionError::MissingRouteInstruction)?;
            debug!(
                target: "transaction::composer",
                instruction,
                requires_wsol = rewrite.requires_wsol,
                "占位身份替换完成"
            );
            instructions = rewrite.instructions;
        }

        let route_index = instructions
            .iter()
            .position(is_jupiter_route)
            .ok_or(CompositionError::MissingRouteInstruction)?;
        instructions[route_index] =
            self.spliced_instruction(request, &amounts, &instructions[route_index])?;

        let extra_units = if shape.touches_game() {
            self.compute_units.with_game
        } else {
            self.compute_units.ivy_only
        };
        if !bump_compute_unit_limit(&mut instructions, extra_units) {
            debug!(
                target: "transaction::composer",
                instruction,
                "聚合器交易未设置计算单元上限"
            );
        }
        if !has_compute_unit_price(&instructions) {
            instructions.push(compute_unit_price_instruction(
                self.fees.get_for(instruction),
            ));
        }

        let transaction = compile_unsigned_v0(&caller, &instructions, &tables, blockhash)?;
        self.report(instruction, &transaction)?;

        Ok(ComposedTransaction {
            transaction,
            last_valid_block_height: response.last_valid_block_height,
            context_slot: None,
            instruction,
        })
    }

    fn spliced_instruction(
        &self,
        request: &ComposeRequest,
        amounts: &RawAmounts,
        jupiter: &Instruction,
    ) -> Result<Instruction, CompositionError> {
        let caller = &request.caller;
        let ix = match request.shape {
            RouteShape::MixAnyToGame => {
                let game = self.game_addresses(request)?;
                self.program
                    .mix_any_to_game(&game, caller, amounts.min_output, jupiter)?
            }
            RouteShape::MixGameToAny => {
                let game = self.game_addresses(request)?;
                self.program.mix_game_to_any(
                    &game,
                    caller,
                    amounts.input,
                    amounts.min_output,
                    jupiter,
                )?
            }
            RouteShape::MixAnyToIvy => {
                self.program
                    .mix_any_to_ivy(caller, amounts.min_output, jupiter)?
            }
            RouteShape::MixIvyToAny => {
                self.program
                    .mix_ivy_to_any(caller, amounts.input, amounts.min_output, jupiter)?
            }
            shape => return Err(CompositionError::UnsupportedRoute { shape }),
        };
        Ok(ix)
    }

    fn game_addresses(&self, request: &ComposeRequest) -> Result<GameAddresses, CompositionError> {
        let game = request.game.ok_or(CompositionError::MissingGame {
            instruction: request.shape.instruction_name(),
        })?;
        Ok(self.program.game_addresses(&game.address)?)
    }

    /// 拼接形态必须带上游戏兑换 ALT 或世界 ALT。
    async fn required_table_key(&self, request: &ComposeRequest) -> Result<Pubkey, CompositionError> {
        if request.shape.touches_game() {
            let game = request.game.ok_or(CompositionError::MissingGame {
                instruction: request.shape.instruction_name(),
            })?;
            return game
                .swap_alt
                .ok_or(CompositionError::LookupTableNotConfigured {
                    purpose: "game_swap",
                });
        }
        let world = self
            .ledger
            .world_alt()
            .await?
            .ok_or(CompositionError::LookupTableNotConfigured { purpose: "world" })?;
        Ok(world.key)
    }

    /// 直接形态有配置才使用 ALT。
    async fn optional_tables(
        &self,
        request: &ComposeRequest,
    ) -> Result<Vec<AddressLookupTableAccount>, CompositionError> {
        if request.shape.touches_game() {
            let Some(key) = request.game.and_then(|game| game.swap_alt) else {
                return Ok(Vec::new());
            };
            return Ok(vec![self.alts.fetch_one(key).await?]);
        }
        Ok(self.ledger.world_alt().await?.into_iter().collect())
    }

    fn report(
        &self,
        instruction: &'static str,
        transaction: &VersionedTransaction,
    ) -> Result<(), CompositionError> {
        let encoded = encode_transaction(transaction)?;
        self.fees.provide(instruction, encoded);
        Ok(())
    }
}

fn require_quote(request: &ComposeRequest) -> Result<&QuoteResponse, CompositionError> {
    request
        .aggregator_quote
        .as_deref()
        .ok_or(CompositionError::MissingAggregatorQuote {
            instruction: request.shape.instruction_name(),
        })
}

fn raw_amounts(request: &ComposeRequest) -> Result<RawAmounts, CompositionError> {
    let input = request
        .input
        .to_raw(request.input_amount)
        .ok_or_else(|| CompositionError::AmountOutOfRange {
            amount: request.input_amount,
            symbol: request.input.symbol.clone(),
        })?;
    let min_output = request
        .output
        .to_raw(request.min_output_amount)
        .ok_or_else(|| CompositionError::AmountOutOfRange {
            amount: request.min_output_amount,
            symbol: request.output.symbol.clone(),
        })?;
    Ok(RawAmounts { input, min_output })
}
