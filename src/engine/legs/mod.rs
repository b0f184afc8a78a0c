//! 六条腿的估值函数：`(StepResult, 参数…, enabled) -> StepResult`。
//!
//! 未启用的腿原样透传；输入已断或无流动性时返回断链结果，不产生错误。

pub mod aggregator;

use rust_decimal::Decimal;
use tracing::debug;

use super::curve::{CurveQuote, CurveQuoter, Direction};
use super::step::{FeeConfig, GameReserves, LegOutcome, StepResult, WorldReserves};

pub use aggregator::{AggregatorDirection, AggregatorLeg};

pub const IVY_VENUE: &str = "Ivy";

pub fn usdc_to_ivy(input: StepResult, curve: &dyn CurveQuoter, enabled: bool) -> StepResult {
    world_leg(input, curve, Direction::Buy, enabled)
}

pub fn ivy_to_usdc(input: StepResult, curve: &dyn CurveQuoter, enabled: bool) -> StepResult {
    world_leg(input, curve, Direction::Sell, enabled)
}

pub fn ivy_to_game(
    input: StepResult,
    curve: &dyn CurveQuoter,
    game: Option<&GameReserves>,
    fees: Option<&FeeConfig>,
    enabled: bool,
) -> StepResult {
    game_leg(input, curve, game, fees, Direction::Buy, enabled)
}

pub fn game_to_ivy(
    input: StepResult,
    curve: &dyn CurveQuoter,
    game: Option<&GameReserves>,
    fees: Option<&FeeConfig>,
    enabled: bool,
) -> StepResult {
    game_leg(input, curve, game, fees, Direction::Sell, enabled)
}

fn world_leg(
    input: StepResult,
    curve: &dyn CurveQuoter,
    direction: Direction,
    enabled: bool,
) -> StepResult {
    if !enabled {
        return input;
    }
    let (Some(amount), Some(world)) = (input.amount, input.world_reserves.clone()) else {
        return input.dead();
    };
    let Some(quote) = curve.world_quote(&world, amount, direction) else {
        debug!(
            target: "engine::legs",
            amount = %amount,
            is_buy = direction.is_buy(),
            "世界曲线无法报价"
        );
        return input.dead();
    };
    let Some(advanced) = advance_world(&world, amount, &quote, direction) else {
        return input.dead();
    };
    input.advance(outcome(quote, Some(advanced)))
}

fn game_leg(
    input: StepResult,
    curve: &dyn CurveQuoter,
    game: Option<&GameReserves>,
    fees: Option<&FeeConfig>,
    direction: Direction,
    enabled: bool,
) -> StepResult {
    if !enabled {
        return input;
    }
    let (Some(amount), Some(world), Some(game), Some(fees)) =
        (input.amount, input.world_reserves.as_ref(), game, fees)
    else {
        return input.dead();
    };
    let Some(quote) = curve.game_quote(game, fees, world, amount, direction) else {
        debug!(
            target: "engine::legs",
            amount = %amount,
            is_buy = direction.is_buy(),
            "游戏池无法报价"
        );
        return input.dead();
    };
    input.advance(outcome(quote, None))
}

/// 世界曲线快照推演：买入增加已售量，卖出减少。
fn advance_world(
    world: &WorldReserves,
    input_amount: Decimal,
    quote: &CurveQuote,
    direction: Direction,
) -> Option<WorldReserves> {
    let ivy_sold = match direction {
        Direction::Buy => world.ivy_sold.checked_add(quote.output_amount)?,
        Direction::Sell => world.ivy_sold.checked_sub(input_amount)?,
    };
    Some(WorldReserves {
        ivy_sold,
        ..world.clone()
    })
}

fn outcome(quote: CurveQuote, world_reserves: Option<WorldReserves>) -> LegOutcome {
    LegOutcome {
        amount: quote.output_amount,
        price_impact_bps: quote.price_impact_bps,
        input_usd: Some(quote.input_usd),
        output_usd: Some(quote.output_usd),
        world_reserves,
        aggregator_quote: None,
        venues: vec![IVY_VENUE.to_string()],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 固定比例的假曲线：世界曲线 1 USDC = 100 IVY，游戏池 1 IVY = 5 GAME。
    #[derive(Debug, Default)]
    pub(crate) struct FixedCurve;

    impl CurveQuoter for FixedCurve {
        fn world_quote(
            &self,
            _world: &WorldReserves,
            input_amount: Decimal,
            direction: Direction,
        ) -> Option<CurveQuote> {
            let (output, usd) = match direction {
                Direction::Buy => (input_amount * Decimal::from(100), input_amount),
                Direction::Sell => {
                    let usdc = input_amount / Decimal::from(100);
                    (usdc, usdc)
                }
            };
            Some(CurveQuote {
                output_amount: output,
                input_usd: usd,
                output_usd: usd,
                price_impact_bps: Decimal::from(10),
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
            if input_amount.is_zero() {
                return None;
            }
            let output = match direction {
                Direction::Buy => input_amount * Decimal::from(5),
                Direction::Sell => input_amount / Decimal::from(5),
            };
            Some(CurveQuote {
                output_amount: output,
                input_usd: Decimal::ONE,
                output_usd: Decimal::ONE,
                price_impact_bps: Decimal::from(20),
            })
        }
    }

    pub(crate) fn world() -> WorldReserves {
        WorldReserves {
            ivy_sold: Decimal::from(1_000),
            ivy_curve_max: Decimal::from(1_000_000),
            curve_input_scale: Decimal::ONE,
        }
    }

    pub(crate) fn game() -> GameReserves {
        GameReserves {
            ivy_balance: Decimal::from(10_000),
            game_balance: Decimal::from(50_000),
        }
    }

    pub(crate) fn fees() -> FeeConfig {
        FeeConfig {
            ivy_fee_bps: 30,
            game_fee_bps: 30,
        }
    }

    #[test]
    fn disabled_leg_passes_through() {
        let seeded = StepResult::seed(Decimal::from(2), Some(world()));
        let out = usdc_to_ivy(seeded, &FixedCurve, false);
        assert_eq!(out.amount, Some(Decimal::from(2)));
        assert!(out.stops.is_empty());
    }

    #[test]
    fn world_buy_advances_snapshot() {
        let seeded = StepResult::seed(Decimal::from(2), Some(world()));
        let out = usdc_to_ivy(seeded, &FixedCurve, true);
        assert_eq!(out.amount, Some(Decimal::from(200)));
        assert_eq!(
            out.world_reserves.as_ref().map(|w| w.ivy_sold),
            Some(Decimal::from(1_200))
        );
        assert_eq!(out.input_usd, Some(Decimal::from(2)));

        let sold = ivy_to_usdc(out, &FixedCurve, true);
        assert_eq!(sold.amount, Some(Decimal::from(2)));
        assert_eq!(
            sold.world_reserves.as_ref().map(|w| w.ivy_sold),
            Some(Decimal::from(1_000))
        );
        assert_eq!(sold.stops.as_slice(), [IVY_VENUE.to_string()]);
    }

    #[test]
    fn missing_market_data_kills_chain() {
        let no_world = StepResult::seed(Decimal::ONE, None);
        assert!(usdc_to_ivy(no_world, &FixedCurve, true).is_dead());

        let seeded = StepResult::seed(Decimal::ONE, Some(world()));
        assert!(ivy_to_game(seeded.clone(), &FixedCurve, None, Some(&fees()), true).is_dead());
        assert!(ivy_to_game(seeded, &FixedCurve, Some(&game()), None, true).is_dead());
    }

    #[test]
    fn game_leg_keeps_world_snapshot() {
        let seeded = StepResult::seed(Decimal::from(3), Some(world()));
        let out = ivy_to_game(seeded, &FixedCurve, Some(&game()), Some(&fees()), true);
        assert_eq!(out.amount, Some(Decimal::from(15)));
        assert_eq!(out.world_reserves, Some(world()));
        assert_eq!(out.price_impact_bps, Decimal::from(20));

        let back = game_to_ivy(out, &FixedCurve, Some(&game()), Some(&fees()), true);
        assert_eq!(back.amount, Some(Decimal::from(3)));
    }

    #[test]
    fn dead_input_stays_dead() {
        let dead = StepResult::seed(Decimal::ONE, Some(world())).dead();
        let out = ivy_to_game(dead, &FixedCurve, Some(&game()), Some(&fees()), true);
        assert!(out.is_dead());
    }
}
