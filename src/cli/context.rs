use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use tracing_subscriber::{EnvFilter, fmt};

use crate::api::jupiter::JupiterApiClient;
use crate::cache::{AltCache, LedgerContext};
use crate::config::{AppConfig, ConfigError, LoggingProfile, load_config};
use crate::engine::{FeeConfig, GameContext, GameReserves, WorldReserves};
use crate::fees::{HeliusFeeEstimator, PriorityFeeFeed};
use crate::instructions::ivy::IvyProgram;
use crate::token::{TokenDescriptor, TokenRegistry};
use crate::transaction::{PlaceholderIdentity, TransactionComposer};

pub fn init_tracing(config: &crate::config::LoggingConfig) -> Result<()> {
    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Lean 模式压低 HTTP 依赖的输出，显式写在 level 里的目标不覆盖
    if matches!(config.profile, LoggingProfile::Lean) {
        const QUIET_TARGETS: &[(&str, &str)] = &[
            ("hyper", "warn"),
            ("hyper_util::client::legacy", "warn"),
            ("reqwest", "info"),
            ("rustls", "warn"),
        ];
        for (module, level) in QUIET_TARGETS {
            if !config.level.contains(module) {
                if let Ok(directive) = format!("{module}={level}").parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
    }

    if matches!(config.profile, LoggingProfile::Verbose) {
        const VERBOSE_TARGETS: &[(&str, &str)] = &[
            ("jupiter::quote", "debug"),
            ("jupiter::swap", "debug"),
            ("engine::legs", "debug"),
            ("transaction::composer", "debug"),
        ];
        for (module, level) in VERBOSE_TARGETS {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let base = fmt()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if config.json {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    } else {
        base.with_env_filter(filter)
            .event_format(fmt::format().compact())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(())
}

/// 加载主配置；用于 `ivy-swap --config` 的入口。
pub fn load_configuration(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    load_config(path)
}

/// `--market` 指向的市场快照，由调用方从链上账户整理得到。
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub world: Option<WorldReserves>,
    #[serde(default)]
    pub game: Option<GameMarket>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct GameMarket {
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    #[serde(default = "default_game_symbol")]
    pub symbol: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub swap_alt: Option<Pubkey>,
    pub reserves: GameReserves,
    pub fees: FeeConfig,
}

fn default_game_symbol() -> String {
    "GAME".to_string()
}

impl GameMarket {
    pub fn token(&self) -> TokenDescriptor {
        TokenDescriptor::game(self.mint, self.symbol.clone())
    }

    pub fn context(&self) -> GameContext {
        GameContext {
            address: self.address,
            mint: self.mint,
            swap_alt: self.swap_alt,
            reserves: self.reserves.clone(),
            fees: self.fees,
        }
    }
}

impl MarketSnapshot {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                world: None,
                game: None,
            });
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取市场快照 {} 失败", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("解析市场快照 {} 失败", path.display()))
    }
}

/// 内置代币、配置中的 `[[tokens]]`、token list 文件与当前游戏代币。
pub fn build_registry(
    config: &AppConfig,
    ivy_mint: Pubkey,
    token_list: Option<&Path>,
    market: &MarketSnapshot,
) -> Result<TokenRegistry> {
    let mut registry = TokenRegistry::with_defaults(ivy_mint);
    registry.extend(config.tokens.iter().cloned());
    if let Some(path) = token_list {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取 token list {} 失败", path.display()))?;
        registry
            .load_token_list(&raw)
            .with_context(|| format!("解析 token list {} 失败", path.display()))?;
    }
    if let Some(game) = &market.game {
        registry.insert(game.token());
    }
    Ok(registry)
}

pub fn lookup_token(registry: &TokenRegistry, mint: &Pubkey) -> Result<TokenDescriptor> {
    registry
        .get(mint)
        .cloned()
        .ok_or_else(|| anyhow!("未知代币 {mint}，请在 [[tokens]] 或 --token-list 中提供"))
}

pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client> {
    let timeout = config
        .jupiter
        .quote_timeout_ms
        .max(config.jupiter.swap_timeout_ms)
        .max(config.jupiter.price_timeout_ms);
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .context("构建 HTTP 客户端失败")
}

pub fn build_jupiter_client(config: &AppConfig, http: reqwest::Client) -> JupiterApiClient {
    JupiterApiClient::new(http, &config.jupiter, &config.global.logging)
}

/// 未配置 Helius 地址时退回主 RPC。
pub fn build_fee_feed(config: &AppConfig, http: reqwest::Client) -> Arc<PriorityFeeFeed> {
    let url = config
        .fees
        .helius_rpc_url
        .clone()
        .unwrap_or_else(|| config.global.rpc_url.clone());
    let estimator = Arc::new(HeliusFeeEstimator::new(http, url));
    Arc::new(PriorityFeeFeed::new(estimator, &config.fees))
}

pub fn build_composer(
    config: &AppConfig,
    program: IvyProgram,
    jupiter: Arc<JupiterApiClient>,
    fees: Arc<PriorityFeeFeed>,
) -> TransactionComposer {
    let rpc = Arc::new(RpcClient::new(config.global.rpc_url.clone()));
    let alts = AltCache::new(
        rpc.clone(),
        Duration::from_secs(config.cache.alt_ttl_secs),
    );
    let ledger = LedgerContext::new(rpc, alts.clone(), config.ivy.world_alt, &config.cache);
    TransactionComposer::new(
        jupiter,
        alts,
        ledger,
        fees,
        program,
        PlaceholderIdentity::from(&config.ivy.placeholder),
        config.ivy.compute_units,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn market_snapshot_with_game() {
        let address = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let doc = format!(
            r#"{{
  "world": {{"ivy_sold": "1000", "ivy_curve_max": "1000000", "curve_input_scale": "0.5"}},
  "game": {{
    "address": "{address}",
    "mint": "{mint}",
    "symbol": "DICE",
    "reserves": {{"ivy_balance": "500", "game_balance": "2000"}},
    "fees": {{"ivy_fee_bps": 30, "game_fee_bps": 20}}
  }}
}}"#
        );
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(doc.as_bytes()).unwrap();

        let market = MarketSnapshot::load(Some(file.path())).expect("load");
        let game = market.game.as_ref().expect("game");
        assert_eq!(game.address, address);
        assert!(game.swap_alt.is_none());
        assert_eq!(game.fees.ivy_fee_bps, 30);
        assert_eq!(game.token().symbol, "DICE");
        assert_eq!(game.context().mint, mint);
        assert!(market.world.is_some());

        let registry =
            build_registry(&AppConfig::default(), Pubkey::new_unique(), None, &market).unwrap();
        assert_eq!(lookup_token(&registry, &mint).unwrap().decimals, 9);
        assert!(lookup_token(&registry, &Pubkey::new_unique()).is_err());
    }

    #[test]
    fn missing_market_is_empty() {
        let market = MarketSnapshot::load(None).expect("empty");
        assert!(market.world.is_none());
        assert!(market.game.is_none());
    }
}
