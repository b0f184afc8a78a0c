//! 路由解析：将 (输入, 输出) 代币对映射为有序的兑换腿。

use std::fmt;

use smallvec::SmallVec;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::trace;

use crate::token::{TokenDescriptor, TokenRole, TokenUniverse};

/// 单步兑换，选择而非构造。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    AnyToUsdc,
    UsdcToIvy,
    IvyToGame,
    GameToIvy,
    IvyToUsdc,
    UsdcToAny,
}

/// 流水线固定顺序，未启用的腿直接透传。
pub const PIPELINE: [Leg; 6] = [
    Leg::AnyToUsdc,
    Leg::UsdcToIvy,
    Leg::IvyToGame,
    Leg::GameToIvy,
    Leg::IvyToUsdc,
    Leg::UsdcToAny,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Aggregator,
    WorldCurve,
    GamePool,
}

impl Leg {
    pub fn venue(self) -> Venue {
        match self {
            Leg::AnyToUsdc | Leg::UsdcToAny => Venue::Aggregator,
            Leg::UsdcToIvy | Leg::IvyToUsdc => Venue::WorldCurve,
            Leg::IvyToGame | Leg::GameToIvy => Venue::GamePool,
        }
    }

    pub fn is_external(self) -> bool {
        matches!(self.venue(), Venue::Aggregator)
    }

    /// 与本腿方向相反、不可同处一条路线的腿。
    pub fn opposite(self) -> Leg {
        match self {
            Leg::AnyToUsdc => Leg::UsdcToAny,
            Leg::UsdcToAny => Leg::AnyToUsdc,
            Leg::UsdcToIvy => Leg::IvyToUsdc,
            Leg::IvyToUsdc => Leg::UsdcToIvy,
            Leg::IvyToGame => Leg::GameToIvy,
            Leg::GameToIvy => Leg::IvyToGame,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Leg::AnyToUsdc => "any_to_usdc",
            Leg::UsdcToIvy => "usdc_to_ivy",
            Leg::IvyToGame => "ivy_to_game",
            Leg::GameToIvy => "game_to_ivy",
            Leg::IvyToUsdc => "ivy_to_usdc",
            Leg::UsdcToAny => "usdc_to_any",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 交易组装形态，对应最终使用的程序指令。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteShape {
    GameSwap { is_buy: bool },
    MixUsdcToGame,
    MixAnyToGame,
    MixGameToUsdc,
    MixGameToAny,
    WorldSwap { is_buy: bool },
    MixAnyToIvy,
    MixIvyToAny,
    /// 仅一条聚合器腿，由聚合器直接为调用方构建
    JupiterSwap,
    /// 两条聚合器腿无法放进同一笔交易
    Unsupported,
}

impl RouteShape {
    pub fn instruction_name(self) -> &'static str {
        match self {
            RouteShape::GameSwap { .. } => "GameSwap",
            RouteShape::MixUsdcToGame => "MixUsdcToGame",
            RouteShape::MixAnyToGame => "MixAnyToGame",
            RouteShape::MixGameToUsdc => "MixGameToUsdc",
            RouteShape::MixGameToAny => "MixGameToAny",
            RouteShape::WorldSwap { .. } => "WorldSwap",
            RouteShape::MixAnyToIvy => "MixAnyToIvy",
            RouteShape::MixIvyToAny => "MixIvyToAny",
            RouteShape::JupiterSwap => "JupiterSwap",
            RouteShape::Unsupported => "",
        }
    }

    /// 需要把聚合器指令嵌入程序指令的形态。
    pub fn is_spliced(self) -> bool {
        matches!(
            self,
            RouteShape::MixAnyToGame
                | RouteShape::MixGameToAny
                | RouteShape::MixAnyToIvy
                | RouteShape::MixIvyToAny
        )
    }

    /// 聚合器腿位于输出端，需要以占位身份构建再替换账户。
    pub fn uses_placeholder(self) -> bool {
        matches!(self, RouteShape::MixGameToAny | RouteShape::MixIvyToAny)
    }

    pub fn touches_game(self) -> bool {
        matches!(
            self,
            RouteShape::GameSwap { .. }
                | RouteShape::MixUsdcToGame
                | RouteShape::MixAnyToGame
                | RouteShape::MixGameToUsdc
                | RouteShape::MixGameToAny
        )
    }
}

impl fmt::Display for RouteShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.instruction_name())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("输入与输出为同一代币 {mint}，拒绝解析路由")]
    SameAsset { mint: Pubkey },
}

/// 有序腿序列，长度 0–3。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    legs: SmallVec<[Leg; 3]>,
    input_role: TokenRole,
    output_role: TokenRole,
}

impl Route {
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn contains(&self, leg: Leg) -> bool {
        self.legs.contains(&leg)
    }

    pub fn roles(&self) -> (TokenRole, TokenRole) {
        (self.input_role, self.output_role)
    }

    pub fn aggregator_legs(&self) -> usize {
        self.legs.iter().filter(|leg| leg.is_external()).count()
    }

    /// 同一路线内不存在同一中间资产的买卖两个方向。
    pub fn is_direction_consistent(&self) -> bool {
        self.legs
            .iter()
            .all(|leg| !self.legs.contains(&leg.opposite()))
    }

    pub fn shape(&self) -> RouteShape {
        use TokenRole::*;
        match (self.input_role, self.output_role) {
            (Ivy, Game) => RouteShape::GameSwap { is_buy: true },
            (Usdc, Game) => RouteShape::MixUsdcToGame,
            (_, Game) => RouteShape::MixAnyToGame,
            (Game, Ivy) => RouteShape::GameSwap { is_buy: false },
            (Game, Usdc) => RouteShape::MixGameToUsdc,
            (Game, _) => RouteShape::MixGameToAny,
            (Usdc, Ivy) => RouteShape::WorldSwap { is_buy: true },
            (_, Ivy) => RouteShape::MixAnyToIvy,
            (Ivy, Usdc) => RouteShape::WorldSwap { is_buy: false },
            (Ivy, _) => RouteShape::MixIvyToAny,
            _ if self.aggregator_legs() == 1 => RouteShape::JupiterSwap,
            _ => RouteShape::Unsupported,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.legs.iter().map(|leg| leg.as_str()).collect();
        write!(f, "[{}]", names.join(" -> "))
    }
}

/// 按优先级依次匹配决策表。
pub fn resolve(
    universe: &TokenUniverse,
    input: &TokenDescriptor,
    output: &TokenDescriptor,
) -> Result<Route, RouteError> {
    if input.mint == output.mint {
        return Err(RouteError::SameAsset { mint: input.mint });
    }

    let input_role = universe.classify(&input.mint);
    let output_role = universe.classify(&output.mint);
    let mut legs: SmallVec<[Leg; 3]> = SmallVec::new();

    use TokenRole::*;
    if output_role == Game {
        if !matches!(input_role, Ivy | Usdc) {
            legs.push(Leg::AnyToUsdc);
        }
        if input_role != Ivy {
            legs.push(Leg::UsdcToIvy);
        }
        legs.push(Leg::IvyToGame);
    } else if input_role == Game {
        legs.push(Leg::GameToIvy);
        if output_role != Ivy {
            legs.push(Leg::IvyToUsdc);
            if output_role != Usdc {
                legs.push(Leg::UsdcToAny);
            }
        }
    } else if output_role == Ivy {
        if input_role != Usdc {
            legs.push(Leg::AnyToUsdc);
        }
        legs.push(Leg::UsdcToIvy);
    } else if input_role == Ivy {
        legs.push(Leg::IvyToUsdc);
        if output_role != Usdc {
            legs.push(Leg::UsdcToAny);
        }
    } else {
        if input_role != Usdc {
            legs.push(Leg::AnyToUsdc);
        }
        if output_role != Usdc {
            legs.push(Leg::UsdcToAny);
        }
    }

    let route = Route {
        legs,
        input_role,
        output_role,
    };
    debug_assert!(route.is_direction_consistent(), "{route}");
    trace!(
        target: "route",
        input = %input,
        output = %output,
        route = %route,
        "路由解析完成"
    );
    Ok(route)
}
