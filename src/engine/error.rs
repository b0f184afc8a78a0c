use thiserror::Error;

use crate::config::ConfigError;
use crate::route::RouteError;
use crate::transaction::CompositionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("无效的兑换请求: {0}")]
    InvalidRoute(String),
    #[error("组装交易需要钱包地址")]
    WalletRequired,
    #[error("未配置交易组装器")]
    ComposerUnavailable,
    #[error("交易组装失败: {0}")]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<RouteError> for EngineError {
    fn from(err: RouteError) -> Self {
        EngineError::InvalidRoute(err.to_string())
    }
}

impl EngineError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EngineError::Composition(err) if err.is_invariant_violation())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
