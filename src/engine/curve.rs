//! IVY 内部做市曲线：世界 sqrt 曲线与游戏常数乘积池。

use rust_decimal::{Decimal, MathematicalOps};

use super::step::{FeeConfig, GameReserves, WorldReserves};

const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const MAX_IMPACT_BPS: Decimal = BPS_DENOMINATOR;
const NEWTON_MAX_ITERATIONS: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn is_buy(self) -> bool {
        matches!(self, Direction::Buy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveQuote {
    pub output_amount: Decimal,
    pub input_usd: Decimal,
    pub output_usd: Decimal,
    pub price_impact_bps: Decimal,
}

impl CurveQuote {
    fn zero() -> Self {
        Self {
            output_amount: Decimal::ZERO,
            input_usd: Decimal::ZERO,
            output_usd: Decimal::ZERO,
            price_impact_bps: Decimal::ZERO,
        }
    }
}

/// 内部曲线报价服务，纯函数，`None` 表示无流动性或超出曲线范围。
pub trait CurveQuoter: Send + Sync {
    fn world_quote(
        &self,
        world: &WorldReserves,
        input_amount: Decimal,
        direction: Direction,
    ) -> Option<CurveQuote>;

    fn game_quote(
        &self,
        game: &GameReserves,
        fees: &FeeConfig,
        world: &WorldReserves,
        input_amount: Decimal,
        direction: Direction,
    ) -> Option<CurveQuote>;
}

/// 十进制参考实现。
#[derive(Debug, Clone, Copy, Default)]
pub struct SqrtCurveQuoter;

impl CurveQuoter for SqrtCurveQuoter {
    fn world_quote(
        &self,
        world: &WorldReserves,
        input_amount: Decimal,
        direction: Direction,
    ) -> Option<CurveQuote> {
        let sold = world.ivy_sold;
        let scale = world.curve_input_scale;
        let old_price = current_price(sold, scale)?;

        match direction {
            Direction::Buy => {
                let output = exact_reserve_in(sold, world.ivy_curve_max, scale, input_amount)?;
                let new_sold = sold.checked_add(output)?;
                let new_price = current_price(new_sold, scale)?;
                Some(CurveQuote {
                    output_amount: output,
                    input_usd: input_amount,
                    output_usd: exact_tokens_in(new_sold, scale, output)?,
                    price_impact_bps: impact_bps(old_price, new_price)?,
                })
            }
            Direction::Sell => {
                let output = exact_tokens_in(sold, scale, input_amount)?;
                let new_sold = sold.checked_sub(input_amount)?;
                let new_price = current_price(new_sold, scale)?;
                Some(CurveQuote {
                    output_amount: output,
                    input_usd: output,
                    output_usd: output,
                    price_impact_bps: impact_bps(old_price, new_price)?,
                })
            }
        }
    }

    fn game_quote(
        &self,
        game: &GameReserves,
        fees: &FeeConfig,
        world: &WorldReserves,
        input_amount: Decimal,
        direction: Direction,
    ) -> Option<CurveQuote> {
        if input_amount.is_zero() {
            return Some(CurveQuote::zero());
        }
        let ivy = game.ivy_balance;
        let game_balance = game.game_balance;
        if ivy.is_zero() || game_balance.is_zero() {
            return None;
        }

        let initial_price = ivy.checked_div(game_balance)?;
        let (input_reserve, output_reserve, input_fee_bps, output_fee_bps) = match direction {
            Direction::Buy => (ivy, game_balance, fees.ivy_fee_bps, fees.game_fee_bps),
            Direction::Sell => (game_balance, ivy, fees.game_fee_bps, fees.ivy_fee_bps),
        };

        let to_curve = input_amount.checked_sub(fee_of(input_amount, input_fee_bps)?)?;
        if to_curve <= Decimal::ZERO {
            return None;
        }
        let from_curve = swap_base_input(to_curve, input_reserve, output_reserve)?;
        if from_curve <= Decimal::ZERO {
            return None;
        }
        let output = from_curve.checked_sub(fee_of(from_curve, output_fee_bps)?)?;

        let (new_ivy, new_game) = match direction {
            Direction::Buy => (ivy.checked_add(to_curve)?, game_balance.checked_sub(from_curve)?),
            Direction::Sell => (ivy.checked_sub(from_curve)?, game_balance.checked_add(to_curve)?),
        };
        let new_price = if new_ivy > Decimal::ZERO && new_game > Decimal::ZERO {
            new_ivy.checked_div(new_game)?
        } else {
            initial_price
        };
        let price_impact_bps = impact_bps(initial_price, new_price)?;

        let sold = world.ivy_sold;
        let scale = world.curve_input_scale;
        let (input_usd, output_usd) = match direction {
            Direction::Buy => {
                let input_usd = exact_tokens_in(sold, scale, input_amount)?;
                let output_usd = game_value_usd(output, new_game, new_ivy, world);
                (input_usd, output_usd)
            }
            Direction::Sell => {
                let input_usd = game_value_usd(input_amount, game_balance, ivy, world);
                let output_usd = exact_tokens_in(sold, scale, output)?;
                (input_usd, output_usd)
            }
        };

        Some(CurveQuote {
            output_amount: output,
            input_usd,
            output_usd,
            price_impact_bps,
        })
    }
}

/// 游戏代币估值：无手续费换成 IVY，再沿世界曲线卖出。
fn game_value_usd(
    game_amount: Decimal,
    game_reserve: Decimal,
    ivy_reserve: Decimal,
    world: &WorldReserves,
) -> Decimal {
    swap_base_input(game_amount, game_reserve, ivy_reserve)
        .filter(|ivy| *ivy > Decimal::ZERO)
        .and_then(|ivy| exact_tokens_in(world.ivy_sold, world.curve_input_scale, ivy))
        .unwrap_or(Decimal::ZERO)
}

fn fee_of(amount: Decimal, fee_bps: u16) -> Option<Decimal> {
    amount
        .checked_mul(Decimal::from(fee_bps))?
        .checked_div(BPS_DENOMINATOR)
}

/// `(x + dx)(y - dy) = xy`，不含手续费。
pub fn swap_base_input(
    source_amount: Decimal,
    source_reserve: Decimal,
    destination_reserve: Decimal,
) -> Option<Decimal> {
    let denominator = source_reserve.checked_add(source_amount)?;
    if denominator.is_zero() {
        return None;
    }
    source_amount
        .checked_mul(destination_reserve)?
        .checked_div(denominator)
}

pub fn current_price(supply: Decimal, input_scale: Decimal) -> Option<Decimal> {
    supply.checked_mul(input_scale)?.sqrt()
}

/// `sqrt(c·x)` 在 `[a, b]` 上的积分：`2/3·sqrt(c)·(b^1.5 − a^1.5)`。
pub fn integrate_sqrt(scale: Decimal, a: Decimal, b: Decimal) -> Option<Decimal> {
    if b <= a {
        return Some(Decimal::ZERO);
    }
    let delta = pow_three_halves(b)?.checked_sub(pow_three_halves(a)?)?;
    Decimal::TWO
        .checked_mul(scale.sqrt()?)?
        .checked_mul(delta)?
        .checked_div(Decimal::from(3))
}

/// 已知左界与面积，反解右界。
pub fn sqrt_integral_right_bound(scale: Decimal, area: Decimal, a: Decimal) -> Option<Decimal> {
    if scale <= Decimal::ZERO {
        return None;
    }
    let increment = area
        .checked_mul(Decimal::from(3))?
        .checked_div(scale.sqrt()?.checked_mul(Decimal::TWO)?)?;
    pow_two_thirds(pow_three_halves(a)?.checked_add(increment)?)
}

pub fn exact_tokens_in(supply: Decimal, input_scale: Decimal, tokens: Decimal) -> Option<Decimal> {
    if tokens > supply {
        return None;
    }
    integrate_sqrt(input_scale, supply.checked_sub(tokens)?, supply)
}

pub fn exact_reserve_in(
    supply: Decimal,
    max_supply: Decimal,
    input_scale: Decimal,
    reserve: Decimal,
) -> Option<Decimal> {
    let new_supply = sqrt_integral_right_bound(input_scale, reserve, supply)?;
    if new_supply > max_supply {
        return None;
    }
    new_supply.checked_sub(supply)
}

/// `min(floor(|new − old| / old × 10000), 10000)`。
pub fn impact_bps(old_price: Decimal, new_price: Decimal) -> Option<Decimal> {
    if old_price <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    let ratio = (new_price - old_price)
        .abs()
        .checked_div(old_price)?
        .checked_mul(BPS_DENOMINATOR)?
        .floor();
    Some(ratio.min(MAX_IMPACT_BPS))
}

fn pow_three_halves(value: Decimal) -> Option<Decimal> {
    if value <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    value.checked_mul(value.sqrt()?)
}

/// 解 `x^1.5 = term`，牛顿迭代从右侧单调收敛。
fn pow_two_thirds(term: Decimal) -> Option<Decimal> {
    if term <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    let mut x = term.max(Decimal::ONE);
    let three_halves = Decimal::new(15, 1);
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let root = x.sqrt()?;
        if root.is_zero() {
            break;
        }
        let step = x
            .checked_mul(root)?
            .checked_sub(term)?
            .checked_div(three_halves.checked_mul(root)?)?;
        let next = x.checked_sub(step)?;
        if step.is_zero() || next == x || next <= Decimal::ZERO {
            x = next.max(Decimal::ZERO);
            break;
        }
        x = next;
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn close(a: Decimal, b: Decimal, tolerance: &str) -> bool {
        (a - b).abs() <= dec(tolerance)
    }

    fn world() -> WorldReserves {
        WorldReserves {
            ivy_sold: dec("1000000"),
            ivy_curve_max: dec("100000000"),
            curve_input_scale: dec("0.000001"),
        }
    }

    #[test]
    fn integral_and_right_bound_are_inverse() {
        let scale = dec("0.0004");
        let a = dec("2500");
        let b = dec("3600");
        let area = integrate_sqrt(scale, a, b).unwrap();
        let bound = sqrt_integral_right_bound(scale, area, a).unwrap();
        assert!(close(bound, b, "0.000001"), "bound = {bound}");
        assert_eq!(integrate_sqrt(scale, b, a), Some(Decimal::ZERO));
        assert_eq!(sqrt_integral_right_bound(Decimal::ZERO, area, a), None);
    }

    #[test]
    fn exact_tokens_in_rejects_more_than_supply() {
        assert_eq!(exact_tokens_in(dec("10"), dec("1"), dec("11")), None);
        assert!(exact_tokens_in(dec("10"), dec("1"), dec("10")).unwrap() > Decimal::ZERO);
    }

    #[test]
    fn exact_reserve_in_respects_curve_max() {
        let w = world();
        assert!(exact_reserve_in(w.ivy_sold, w.ivy_curve_max, w.curve_input_scale, dec("10")).is_some());
        assert_eq!(
            exact_reserve_in(w.ivy_sold, w.ivy_sold, w.curve_input_scale, dec("10")),
            None
        );
    }

    #[test]
    fn world_buy_then_sell_round_trips_value() {
        let quoter = SqrtCurveQuoter;
        let w = world();
        let buy = quoter.world_quote(&w, dec("100"), Direction::Buy).unwrap();
        assert!(buy.output_amount > Decimal::ZERO);
        assert_eq!(buy.input_usd, dec("100"));
        assert!(close(buy.output_usd, dec("100"), "0.0001"));

        let advanced = WorldReserves {
            ivy_sold: w.ivy_sold + buy.output_amount,
            ..w.clone()
        };
        let sell = quoter
            .world_quote(&advanced, buy.output_amount, Direction::Sell)
            .unwrap();
        assert!(close(sell.output_amount, dec("100"), "0.0001"));
        assert_eq!(sell.input_usd, sell.output_usd);
        assert!(buy.price_impact_bps >= Decimal::ZERO);
        assert!(buy.price_impact_bps <= dec("10000"));
    }

    #[test]
    fn game_quote_applies_fees_on_both_sides() {
        let quoter = SqrtCurveQuoter;
        let reserves = GameReserves {
            ivy_balance: dec("1000"),
            game_balance: dec("1000"),
        };
        let no_fee = FeeConfig {
            ivy_fee_bps: 0,
            game_fee_bps: 0,
        };
        let with_fee = FeeConfig {
            ivy_fee_bps: 100,
            game_fee_bps: 100,
        };
        let plain = quoter
            .game_quote(&reserves, &no_fee, &world(), dec("10"), Direction::Buy)
            .unwrap();
        let charged = quoter
            .game_quote(&reserves, &with_fee, &world(), dec("10"), Direction::Buy)
            .unwrap();
        assert!(close(plain.output_amount, dec("1000") * dec("10") / dec("1010"), "0.0000001"));
        assert!(charged.output_amount < plain.output_amount);
        assert!(plain.price_impact_bps >= dec("200") && plain.price_impact_bps <= dec("201"));
    }

    #[test]
    fn game_quote_edge_cases() {
        let quoter = SqrtCurveQuoter;
        let fees = FeeConfig {
            ivy_fee_bps: 50,
            game_fee_bps: 50,
        };
        let reserves = GameReserves {
            ivy_balance: dec("1000"),
            game_balance: dec("500"),
        };
        let zero = quoter
            .game_quote(&reserves, &fees, &world(), Decimal::ZERO, Direction::Sell)
            .unwrap();
        assert_eq!(zero.output_amount, Decimal::ZERO);

        let empty = GameReserves {
            ivy_balance: Decimal::ZERO,
            game_balance: dec("500"),
        };
        assert_eq!(
            quoter.game_quote(&empty, &fees, &world(), dec("1"), Direction::Buy),
            None
        );

        let full_fee = FeeConfig {
            ivy_fee_bps: 10_000,
            game_fee_bps: 0,
        };
        assert_eq!(
            quoter.game_quote(&reserves, &full_fee, &world(), dec("1"), Direction::Buy),
            None
        );
    }

    #[test]
    fn impact_is_floored_and_capped() {
        assert_eq!(impact_bps(dec("1"), dec("1.00015")), Some(dec("1")));
        assert_eq!(impact_bps(dec("1"), dec("5")), Some(dec("10000")));
        assert_eq!(impact_bps(Decimal::ZERO, dec("5")), Some(Decimal::ZERO));
    }
}
