//! 报价引擎：腿估值、曲线、请求取代与报价编排。

pub mod curve;
pub mod error;
pub mod legs;
pub mod quote;
pub mod step;
pub mod supersede;

pub use curve::SqrtCurveQuoter;
pub use quote::{GameContext, Quote, QuoteEngine, QuoteParams};
pub use step::{FeeConfig, GameReserves, WorldReserves};
