//! 流水线中在各腿之间传递的运行状态。

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::api::jupiter::QuoteResponse;

/// IVY 世界曲线快照，仅在内存中推演，不回写链上。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldReserves {
    pub ivy_sold: Decimal,
    pub ivy_curve_max: Decimal,
    pub curve_input_scale: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameReserves {
    pub ivy_balance: Decimal,
    pub game_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub ivy_fee_bps: u16,
    pub game_fee_bps: u16,
}

#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// `None` 表示链路已断（无流动性 / 无路由 / 请求失败）
    pub amount: Option<Decimal>,
    /// 各腿价格冲击取最大值
    pub price_impact_bps: Decimal,
    /// 第一条能给出估值的腿写入后不再覆盖
    pub input_usd: Option<Decimal>,
    pub output_usd: Option<Decimal>,
    pub world_reserves: Option<WorldReserves>,
    pub aggregator_quote: Option<Arc<QuoteResponse>>,
    /// 依路线顺序去重后的途经场所
    pub stops: SmallVec<[String; 4]>,
}

impl StepResult {
    pub fn seed(amount: Decimal, world_reserves: Option<WorldReserves>) -> Self {
        Self {
            amount: Some(amount),
            world_reserves,
            ..Self::default()
        }
    }

    pub fn dead(self) -> Self {
        Self {
            amount: None,
            ..self
        }
    }

    pub fn is_dead(&self) -> bool {
        self.amount.is_none()
    }

    /// 以本腿输出推进链路，保留既有的 `input_usd`。
    pub(crate) fn advance(self, leg: LegOutcome) -> Self {
        let mut stops = self.stops;
        for venue in leg.venues {
            if !venue.is_empty() && !stops.iter().any(|stop| stop == &venue) {
                stops.push(venue);
            }
        }
        Self {
            amount: Some(leg.amount),
            price_impact_bps: self.price_impact_bps.max(leg.price_impact_bps),
            input_usd: self.input_usd.or(leg.input_usd),
            output_usd: leg.output_usd,
            world_reserves: leg.world_reserves.or(self.world_reserves),
            aggregator_quote: leg.aggregator_quote.or(self.aggregator_quote),
            stops,
        }
    }
}

/// 单腿计算结果，由 [`StepResult::advance`] 合并。
#[derive(Debug, Clone, Default)]
pub(crate) struct LegOutcome {
    pub amount: Decimal,
    pub price_impact_bps: Decimal,
    pub input_usd: Option<Decimal>,
    pub output_usd: Option<Decimal>,
    pub world_reserves: Option<WorldReserves>,
    pub aggregator_quote: Option<Arc<QuoteResponse>>,
    /// 本腿途经的场所标签
    pub venues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_first_input_usd_and_max_impact() {
        let seeded = StepResult::seed(Decimal::from(3), None);
        let first = seeded.advance(LegOutcome {
            amount: Decimal::from(2),
            price_impact_bps: Decimal::from(40),
            input_usd: Some(Decimal::from(9)),
            output_usd: Some(Decimal::from(8)),
            venues: vec!["Ivy".to_string()],
            ..LegOutcome::default()
        });
        let second = first.advance(LegOutcome {
            amount: Decimal::from(1),
            price_impact_bps: Decimal::from(10),
            input_usd: Some(Decimal::from(100)),
            output_usd: Some(Decimal::from(7)),
            venues: vec!["Ivy".to_string()],
            ..LegOutcome::default()
        });
        assert_eq!(second.amount, Some(Decimal::ONE));
        assert_eq!(second.price_impact_bps, Decimal::from(40));
        assert_eq!(second.input_usd, Some(Decimal::from(9)));
        assert_eq!(second.output_usd, Some(Decimal::from(7)));
        assert_eq!(second.stops.as_slice(), ["Ivy".to_string()]);
        assert!(second.dead().is_dead());
    }
}
