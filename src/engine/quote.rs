//! 报价编排：解析路线，按流水线顺序串联六条腿，生成可延迟组装交易的报价。

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::curve::CurveQuoter;
use super::error::{EngineError, EngineResult};
use super::legs::{self, AggregatorDirection, AggregatorLeg};
use super::step::{FeeConfig, GameReserves, StepResult, WorldReserves};
use crate::api::jupiter::{AggregatorSource, QuoteOptions};
use crate::monitoring::record_quote_outcome;
use crate::route::{self, Leg, PIPELINE, Route, RouteShape};
use crate::token::{TokenDescriptor, TokenUniverse};
use crate::transaction::{ComposeRequest, ComposedTransaction, GameTarget, TransactionComposer};

const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const MAX_SLIPPAGE_BPS: u16 = 10_000;

/// 当前交易的游戏及其市场数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameContext {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub swap_alt: Option<Pubkey>,
    pub reserves: GameReserves,
    pub fees: FeeConfig,
}

#[derive(Debug, Clone)]
pub struct QuoteParams {
    pub caller: Option<Pubkey>,
    pub game: Option<GameContext>,
    pub input: TokenDescriptor,
    pub output: TokenDescriptor,
    pub input_amount: Decimal,
    /// 目前只支持 ExactIn，非零即视为无效请求
    pub output_amount: Decimal,
    pub slippage_bps: u16,
    pub world_reserves: Option<WorldReserves>,
    /// 调用方递增该值以强制刷新聚合器报价
    pub refresh_generation: u64,
}

#[derive(Clone)]
pub struct Quote {
    pub input: Decimal,
    /// 无可用价格时为 `None`
    pub input_usd: Option<Decimal>,
    pub output: Decimal,
    pub output_usd: Option<Decimal>,
    pub min_output: Decimal,
    pub max_input: Decimal,
    pub price_impact_bps: Decimal,
    pub slippage_bps: u16,
    pub instruction: &'static str,
    pub stops: Vec<String>,
    pub route: Route,
    pending: PendingComposition,
}

#[derive(Clone)]
struct PendingComposition {
    caller: Option<Pubkey>,
    composer: Option<Arc<TransactionComposer>>,
    request: ComposeRequest,
}

impl fmt::Debug for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quote")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("min_output", &self.min_output)
            .field("price_impact_bps", &self.price_impact_bps)
            .field("instruction", &self.instruction)
            .field("route", &self.route)
            .field("stops", &self.stops)
            .finish_non_exhaustive()
    }
}

impl Quote {
    pub fn shape(&self) -> RouteShape {
        self.pending.request.shape
    }

    /// 按需组装交易，未提供调用方钱包时失败。
    pub async fn get_transaction(&self) -> EngineResult<ComposedTransaction> {
        let caller = self.pending.caller.ok_or(EngineError::WalletRequired)?;
        let composer = self
            .pending
            .composer
            .as_ref()
            .ok_or(EngineError::ComposerUnavailable)?;
        let request = ComposeRequest {
            caller,
            ..self.pending.request.clone()
        };
        Ok(composer.compose(&request).await?)
    }
}

pub struct QuoteEngine {
    ivy_mint: Pubkey,
    curve: Arc<dyn CurveQuoter>,
    any_to_usdc: AggregatorLeg,
    usdc_to_any: AggregatorLeg,
    composer: Option<Arc<TransactionComposer>>,
}

impl QuoteEngine {
    pub fn new(
        ivy_mint: Pubkey,
        curve: Arc<dyn CurveQuoter>,
        aggregator: Arc<dyn AggregatorSource>,
        options: QuoteOptions,
    ) -> Self {
        Self {
            ivy_mint,
            curve,
            any_to_usdc: AggregatorLeg::new(
                AggregatorDirection::IntoUsdc,
                aggregator.clone(),
                options.clone(),
            ),
            usdc_to_any: AggregatorLeg::new(AggregatorDirection::OutOfUsdc, aggregator, options),
            composer: None,
        }
    }

    pub fn with_composer(mut self, composer: Arc<TransactionComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn resolve_route(&self, params: &QuoteParams) -> EngineResult<Route> {
        let game_mint = params.game.as_ref().map(|game| game.mint);
        let universe = TokenUniverse::new(self.ivy_mint, game_mint);
        Ok(route::resolve(&universe, &params.input, &params.output)?)
    }

    /// `Ok(None)` 表示无流动性、请求被后来者取代或已取消。
    pub async fn get_quote(
        &self,
        params: &QuoteParams,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<Quote>> {
        let started = Instant::now();
        if let Err(err) = validate_amounts(params) {
            record_quote_outcome("invalid", "");
            return Err(err);
        }
        let route = match self.resolve_route(params) {
            Ok(route) => route,
            Err(err) => {
                record_quote_outcome("invalid", "");
                return Err(err);
            }
        };
        let shape = route.shape();
        let label = shape_label(shape);

        let Some(step) = self.run_pipeline(params, &route, cancel).await else {
            record_quote_outcome("cancelled", label);
            debug!(target: "engine::quote", route = %route, "报价已取消");
            return Ok(None);
        };
        let Some(output) = step.amount else {
            record_quote_outcome("no_liquidity", label);
            debug!(target: "engine::quote", route = %route, "链路无流动性");
            return Ok(None);
        };

        let quote = self.build_quote(params, route, shape, step, output);
        record_quote_outcome("quoted", label);
        info!(
            target: "engine::quote",
            route = %quote.route,
            instruction = quote.instruction,
            input = %quote.input,
            output = %quote.output,
            impact_bps = %quote.price_impact_bps,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价完成"
        );
        Ok(Some(quote))
    }

    /// 返回 `None` 表示途中被取消。
    async fn run_pipeline(
        &self,
        params: &QuoteParams,
        route: &Route,
        cancel: &CancellationToken,
    ) -> Option<StepResult> {
        let curve = self.curve.as_ref();
        let game_reserves = params.game.as_ref().map(|game| &game.reserves);
        let game_fees = params.game.as_ref().map(|game| &game.fees);
        let mut step = StepResult::seed(params.input_amount, params.world_reserves.clone());

        for leg in PIPELINE {
            let enabled = route.contains(leg);
            step = match leg {
                Leg::AnyToUsdc => {
                    let next = self
                        .any_to_usdc
                        .evaluate(
                            step,
                            &params.input,
                            params.slippage_bps,
                            params.refresh_generation,
                            enabled,
                        )
                        .await;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    next
                }
                Leg::UsdcToIvy => legs::usdc_to_ivy(step, curve, enabled),
                Leg::IvyToGame => {
                    legs::ivy_to_game(step, curve, game_reserves, game_fees, enabled)
                }
                Leg::GameToIvy => {
                    legs::game_to_ivy(step, curve, game_reserves, game_fees, enabled)
                }
                Leg::IvyToUsdc => legs::ivy_to_usdc(step, curve, enabled),
                Leg::UsdcToAny => {
                    let next = self
                        .usdc_to_any
                        .evaluate(
                            step,
                            &params.output,
                            params.slippage_bps,
                            params.refresh_generation,
                            enabled,
                        )
                        .await;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    next
                }
            };
            if step.is_dead() {
                break;
            }
        }
        if cancel.is_cancelled() {
            return None;
        }
        Some(step)
    }

    fn build_quote(
        &self,
        params: &QuoteParams,
        route: Route,
        shape: RouteShape,
        step: StepResult,
        output: Decimal,
    ) -> Quote {
        let slippage = Decimal::from(params.slippage_bps) / BPS_DENOMINATOR;
        let min_output = output * (Decimal::ONE - slippage);
        let request = ComposeRequest {
            caller: params.caller.unwrap_or_default(),
            shape,
            game: params.game.as_ref().map(|game| GameTarget {
                address: game.address,
                swap_alt: game.swap_alt,
            }),
            input: params.input.clone(),
            output: params.output.clone(),
            input_amount: params.input_amount,
            min_output_amount: min_output,
            aggregator_quote: step.aggregator_quote.clone(),
        };
        Quote {
            input: params.input_amount,
            input_usd: step.input_usd,
            output,
            output_usd: step.output_usd,
            min_output,
            max_input: Decimal::ZERO,
            price_impact_bps: step.price_impact_bps,
            slippage_bps: params.slippage_bps,
            instruction: shape.instruction_name(),
            stops: step.stops.to_vec(),
            route,
            pending: PendingComposition {
                caller: params.caller,
                composer: self.composer.clone(),
                request,
            },
        }
    }
}

/// 必须且只能给出输入数量，滑点不超过 100%。
fn validate_amounts(params: &QuoteParams) -> EngineResult<()> {
    if !params.output_amount.is_zero() {
        return Err(EngineError::InvalidRoute(
            "仅支持指定输入数量 (ExactIn)".to_string(),
        ));
    }
    if params.input_amount <= Decimal::ZERO {
        return Err(EngineError::InvalidRoute("输入数量必须大于 0".to_string()));
    }
    if params.slippage_bps > MAX_SLIPPAGE_BPS {
        return Err(EngineError::InvalidRoute(format!(
            "滑点 {} bps 超过上限 {MAX_SLIPPAGE_BPS}",
            params.slippage_bps
        )));
    }
    Ok(())
}

fn shape_label(shape: RouteShape) -> &'static str {
    match shape {
        RouteShape::Unsupported => "Unsupported",
        other => other.instruction_name(),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::prelude::ToPrimitive;
    use tokio::sync::oneshot;

    use super::*;
    use crate::engine::curve::{CurveQuote, Direction, SqrtCurveQuoter};
    use crate::engine::legs::aggregator::tests::FakeAggregator;
    use crate::engine::legs::tests::{fees, game, world};
    use crate::token::USDC_MINT;

    /// 世界曲线 150 USDC = 1 IVY（冲击 12 bps），游戏池 1 IVY = 5 GAME（冲击 30 bps）。
    struct ScenarioCurve;

    const IVY_USD: i64 = 150;

    impl CurveQuoter for ScenarioCurve {
        fn world_quote(
            &self,
            _world: &WorldReserves,
            input_amount: Decimal,
            direction: Direction,
        ) -> Option<CurveQuote> {
            let (output, usd) = match direction {
                Direction::Buy => (input_amount / Decimal::from(IVY_USD), input_amount),
                Direction::Sell => {
                    let output = input_amount * Decimal::from(IVY_USD);
                    (output, output)
                }
            };
            Some(CurveQuote {
                output_amount: output,
                input_usd: usd,
                output_usd: usd,
                price_impact_bps: Decimal::from(12),
            })
        }

        fn game_quote(
            &self,
            _game: &GameReserves,
            _fees: &FeeConfig,
            _world: &WorldReserves,
            input_amount: Decimal,
            direction: Direction,
        ) -> Option<CurveQuote> {
            let (output, ivy) = match direction {
                Direction::Buy => (input_amount * Decimal::from(5), input_amount),
                Direction::Sell => {
                    let output = input_amount / Decimal::from(5);
                    (output, output)
                }
            };
            let usd = ivy * Decimal::from(IVY_USD);
            Some(CurveQuote {
                output_amount: output,
                input_usd: usd,
                output_usd: usd,
                price_impact_bps: Decimal::from(30),
            })
        }
    }

    fn game_context() -> GameContext {
        GameContext {
            address: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            swap_alt: None,
            reserves: game(),
            fees: fees(),
        }
    }

    fn params(
        input: TokenDescriptor,
        output: TokenDescriptor,
        amount: Decimal,
        game: Option<GameContext>,
    ) -> QuoteParams {
        QuoteParams {
            caller: None,
            game,
            input,
            output,
            input_amount: amount,
            output_amount: Decimal::ZERO,
            slippage_bps: 50,
            world_reserves: Some(world()),
            refresh_generation: 0,
        }
    }

    fn engine(curve: Arc<dyn CurveQuoter>, aggregator: Arc<FakeAggregator>) -> (QuoteEngine, Pubkey) {
        let ivy_mint = Pubkey::new_unique();
        let engine = QuoteEngine::new(ivy_mint, curve, aggregator, QuoteOptions::default());
        (engine, ivy_mint)
    }

    #[tokio::test]
    async fn sol_to_game_through_all_three_legs() {
        // 聚合器 1.5 SOL → 150 USDC，冲击 5 bps
        let aggregator = Arc::new(
            FakeAggregator::new(Decimal::new(1, 1), Decimal::from(100)).with_impact_pct("0.0005"),
        );
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator.clone());
        let game = game_context();
        let game_token = TokenDescriptor::game(game.mint, "GAME");
        let params = params(TokenDescriptor::wsol(), game_token, Decimal::new(15, 1), Some(game));

        let quote = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap()
            .expect("quote");
        assert_eq!(
            quote.route.legs(),
            &[Leg::AnyToUsdc, Leg::UsdcToIvy, Leg::IvyToGame]
        );
        assert_eq!(quote.instruction, "MixAnyToGame");
        assert_eq!(quote.input, Decimal::new(15, 1));
        assert_eq!(quote.output, Decimal::from(5));
        // 取各腿最大值，不是 5 + 12 + 30
        assert_eq!(quote.price_impact_bps, Decimal::from(30));
        assert_eq!(quote.input_usd, Some(Decimal::from(150)));
        assert_eq!(quote.output_usd, Some(Decimal::from(150)));
        assert_eq!(quote.min_output, Decimal::new(4975, 3));
        assert_eq!(quote.max_input, Decimal::ZERO);
        assert_eq!(quote.stops, vec!["Whirlpool", "Raydium", "Ivy"]);
        assert_eq!(aggregator.calls(), 1);
    }

    #[tokio::test]
    async fn output_grows_with_input() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, _) = engine(Arc::new(SqrtCurveQuoter), aggregator);
        let game = game_context();
        let game_token = TokenDescriptor::game(game.mint, "GAME");

        let mut last = Decimal::ZERO;
        let mut last_impact = Decimal::ZERO;
        for amount in [1u64, 10, 100, 500, 1_000, 5_000] {
            let params = params(
                TokenDescriptor::usdc(),
                game_token.clone(),
                Decimal::from(amount),
                Some(game.clone()),
            );
            let quote = engine
                .get_quote(&params, &CancellationToken::new())
                .await
                .unwrap()
                .expect("quote");
            assert_eq!(quote.instruction, "MixUsdcToGame");
            assert!(quote.output >= last, "{} < {last}", quote.output);
            assert!(
                quote.price_impact_bps >= last_impact,
                "{} < {last_impact}",
                quote.price_impact_bps
            );
            last = quote.output;
            last_impact = quote.price_impact_bps;
        }
        assert!(last > Decimal::ZERO);
        assert!(last_impact > Decimal::ZERO);
    }

    async fn superseded_pair(release_first_call_first: bool) {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::new(1, 1), Decimal::ONE));
        let (first_gate, first_rx) = oneshot::channel();
        let (second_gate, second_rx) = oneshot::channel();
        aggregator.gates.lock().await.extend([first_rx, second_rx]);
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator.clone());
        let usdc = TokenDescriptor::usdc();
        let first = params(TokenDescriptor::wsol(), usdc.clone(), Decimal::ONE, None);
        let second = params(TokenDescriptor::wsol(), usdc, Decimal::from(2), None);
        let cancel = CancellationToken::new();

        let release = async move {
            tokio::task::yield_now().await;
            if release_first_call_first {
                let _ = first_gate.send(());
                tokio::task::yield_now().await;
                let _ = second_gate.send(());
            } else {
                let _ = second_gate.send(());
                tokio::task::yield_now().await;
                let _ = first_gate.send(());
            }
        };
        let (older, newer, _) = tokio::join!(
            engine.get_quote(&first, &cancel),
            engine.get_quote(&second, &cancel),
            release
        );

        assert!(older.unwrap().is_none());
        let newer = newer.unwrap().expect("latest request wins");
        assert_eq!(newer.output, Decimal::from(200));
        assert_eq!(newer.instruction, "JupiterSwap");
        assert_eq!(aggregator.calls(), 2);
    }

    #[tokio::test]
    async fn newest_request_wins_when_older_finishes_first() {
        superseded_pair(true).await;
    }

    #[tokio::test]
    async fn newest_request_wins_when_older_finishes_last() {
        superseded_pair(false).await;
    }

    #[tokio::test]
    async fn same_mint_is_rejected() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator.clone());
        let params = params(
            TokenDescriptor::usdc(),
            TokenDescriptor::usdc(),
            Decimal::ONE,
            None,
        );
        let err = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRoute(_)));
        assert_eq!(aggregator.calls(), 0);
    }

    #[test]
    fn default_mint_is_not_a_game_without_market() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator);
        let params = params(
            TokenDescriptor::usdc(),
            TokenDescriptor::new(Pubkey::default(), 6, "ONES"),
            Decimal::ONE,
            None,
        );
        let route = engine.resolve_route(&params).expect("route");
        assert_eq!(route.shape(), RouteShape::JupiterSwap);
    }

    #[tokio::test]
    async fn both_amounts_rejected_before_any_call() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator.clone());
        let mut params = params(
            TokenDescriptor::wsol(),
            TokenDescriptor::new(USDC_MINT, 6, "USDC"),
            Decimal::ONE,
            None,
        );
        params.output_amount = Decimal::ONE;
        let err = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRoute(_)));

        params.output_amount = Decimal::ZERO;
        params.input_amount = Decimal::ZERO;
        assert!(engine.get_quote(&params, &CancellationToken::new()).await.is_err());
        assert_eq!(aggregator.calls(), 0);
    }

    #[tokio::test]
    async fn slippage_is_capped_at_full_amount() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::new(1, 1), Decimal::ONE));
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator.clone());
        let mut params = params(
            TokenDescriptor::wsol(),
            TokenDescriptor::usdc(),
            Decimal::ONE,
            None,
        );
        params.slippage_bps = 10_000;
        let quote = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap()
            .expect("quote");
        assert_eq!(quote.output, Decimal::from(100));
        assert_eq!(quote.min_output, Decimal::ZERO);
        assert_eq!(aggregator.calls(), 1);

        params.slippage_bps = 10_001;
        let err = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRoute(_)));
        assert_eq!(aggregator.calls(), 1);
    }

    #[tokio::test]
    async fn unpriced_input_is_reported_as_unknown() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::new(1, 1), Decimal::ONE).without_price());
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator);
        let params = params(
            TokenDescriptor::wsol(),
            TokenDescriptor::usdc(),
            Decimal::ONE,
            None,
        );
        let quote = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap()
            .expect("quote");
        assert_eq!(quote.output, Decimal::from(100));
        assert_eq!(quote.input_usd, None);
        assert_eq!(quote.output_usd, Some(Decimal::from(100)));
    }

    #[tokio::test]
    async fn cancelled_request_yields_nothing() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, _) = engine(Arc::new(ScenarioCurve), aggregator);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let params = params(
            TokenDescriptor::wsol(),
            TokenDescriptor::usdc(),
            Decimal::ONE,
            None,
        );
        assert!(engine.get_quote(&params, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_chain_is_not_an_error() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, ivy_mint) = engine(Arc::new(ScenarioCurve), aggregator);
        let mut params = params(
            TokenDescriptor::usdc(),
            TokenDescriptor::ivy(ivy_mint),
            Decimal::ONE,
            None,
        );
        params.world_reserves = None;
        assert!(
            engine
                .get_quote(&params, &CancellationToken::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn transaction_requires_wallet_and_composer() {
        let aggregator = Arc::new(FakeAggregator::new(Decimal::ONE, Decimal::ONE));
        let (engine, ivy_mint) = engine(Arc::new(ScenarioCurve), aggregator);
        let mut params = params(
            TokenDescriptor::usdc(),
            TokenDescriptor::ivy(ivy_mint),
            Decimal::from(150),
            None,
        );
        let quote = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap()
            .expect("quote");
        assert_eq!(quote.shape(), RouteShape::WorldSwap { is_buy: true });
        assert_eq!(quote.output.to_u64(), Some(1));
        assert!(matches!(
            quote.get_transaction().await,
            Err(EngineError::WalletRequired)
        ));

        params.caller = Some(Pubkey::new_unique());
        let quote = engine
            .get_quote(&params, &CancellationToken::new())
            .await
            .unwrap()
            .expect("quote");
        assert!(matches!(
            quote.get_transaction().await,
            Err(EngineError::ComposerUnavailable)
        ));
    }
}
