use solana_sdk::pubkey::Pubkey;

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use self::types as cfg;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_logging_profile() -> cfg::LoggingProfile {
    cfg::LoggingProfile::Lean
}

pub(crate) fn default_slow_quote_warn_ms() -> u64 {
    400
}

pub(crate) fn default_slow_swap_warn_ms() -> u64 {
    200
}

pub(crate) fn default_placeholder_owner() -> Pubkey {
    solana_sdk::pubkey!("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM")
}

pub(crate) fn default_placeholder_wsol_account() -> Pubkey {
    solana_sdk::pubkey!("Ft7A291TPAvLzckj1jfBRqww5eqvaerJ1nUnDJSnUY8a")
}

pub(crate) fn default_ivy_only_compute_units() -> u32 {
    80_000
}

pub(crate) fn default_with_game_compute_units() -> u32 {
    160_000
}

pub(crate) fn default_jupiter_quote_url() -> String {
    "https://lite-api.jup.ag/swap/v1/quote".to_string()
}

pub(crate) fn default_jupiter_swap_url() -> String {
    "https://lite-api.jup.ag/swap/v1/swap".to_string()
}

pub(crate) fn default_jupiter_price_url() -> String {
    "https://fe-api.jup.ag/api/v1/prices".to_string()
}

pub(crate) fn default_quote_timeout_ms() -> u64 {
    2_000
}

pub(crate) fn default_swap_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_price_timeout_ms() -> u64 {
    2_000
}

pub(crate) fn default_max_accounts() -> u16 {
    24
}

pub(crate) fn default_exclude_dexes() -> Vec<String> {
    vec!["Obric V2".to_string()]
}

pub(crate) fn default_fee_interval_ms() -> u64 {
    2_000
}

pub(crate) fn default_fee_beta() -> f64 {
    0.7
}

pub(crate) fn default_priority_fee() -> u64 {
    30_000
}

pub(crate) fn default_max_priority_fee() -> u64 {
    999_999
}

pub(crate) fn default_fee_window_secs() -> u64 {
    60
}

pub(crate) fn default_fee_stale_after_secs() -> u64 {
    300
}

pub(crate) fn default_slot_update_ms() -> u64 {
    2_000
}

pub(crate) fn default_slot_expiry_ms() -> u64 {
    5_000
}

pub(crate) fn default_blockhash_update_ms() -> u64 {
    5_000
}

pub(crate) fn default_blockhash_expiry_ms() -> u64 {
    30_000
}

pub(crate) fn default_alt_ttl_secs() -> u64 {
    300
}

pub(crate) fn default_prometheus_listen() -> String {
    "0.0.0.0:9898".to_string()
}

impl Default for cfg::AppConfig {
    fn default() -> Self {
        Self {
            global: cfg::GlobalConfig::default(),
            ivy: cfg::IvyConfig::default(),
            jupiter: cfg::JupiterConfig::default(),
            fees: cfg::FeesConfig::default(),
            cache: cfg::CacheConfig::default(),
            prometheus: cfg::PrometheusConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl Default for cfg::GlobalConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            logging: cfg::LoggingConfig::default(),
        }
    }
}

impl Default for cfg::LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level(),
            json: false,
            profile: default_logging_profile(),
            slow_quote_warn_ms: default_slow_quote_warn_ms(),
            slow_swap_warn_ms: default_slow_swap_warn_ms(),
        }
    }
}

impl Default for cfg::IvyConfig {
    fn default() -> Self {
        Self {
            program_id: None,
            world_alt: None,
            placeholder: cfg::PlaceholderConfig::default(),
            compute_units: cfg::ComputeUnitConfig::default(),
        }
    }
}

impl Default for cfg::PlaceholderConfig {
    fn default() -> Self {
        Self {
            owner: default_placeholder_owner(),
            wsol_account: default_placeholder_wsol_account(),
        }
    }
}

impl Default for cfg::ComputeUnitConfig {
    fn default() -> Self {
        Self {
            ivy_only: default_ivy_only_compute_units(),
            with_game: default_with_game_compute_units(),
        }
    }
}

impl Default for cfg::JupiterConfig {
    fn default() -> Self {
        Self {
            quote_url: default_jupiter_quote_url(),
            swap_url: default_jupiter_swap_url(),
            price_url: default_jupiter_price_url(),
            quote_timeout_ms: default_quote_timeout_ms(),
            swap_timeout_ms: default_swap_timeout_ms(),
            price_timeout_ms: default_price_timeout_ms(),
            max_accounts: default_max_accounts(),
            exclude_dexes: default_exclude_dexes(),
            only_direct_routes: true,
            restrict_intermediate_tokens: true,
        }
    }
}

impl Default for cfg::FeesConfig {
    fn default() -> Self {
        Self {
            helius_rpc_url: None,
            interval_ms: default_fee_interval_ms(),
            beta: default_fee_beta(),
            default_micro_lamports: default_priority_fee(),
            max_micro_lamports: default_max_priority_fee(),
            window_secs: default_fee_window_secs(),
            stale_after_secs: default_fee_stale_after_secs(),
        }
    }
}

impl Default for cfg::CacheConfig {
    fn default() -> Self {
        Self {
            slot_update_ms: default_slot_update_ms(),
            slot_expiry_ms: default_slot_expiry_ms(),
            blockhash_update_ms: default_blockhash_update_ms(),
            blockhash_expiry_ms: default_blockhash_expiry_ms(),
            alt_ttl_secs: default_alt_ttl_secs(),
        }
    }
}

impl Default for cfg::PrometheusConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_prometheus_listen(),
        }
    }
}
