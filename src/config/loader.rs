use std::fs;
use std::path::{Path, PathBuf};

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use url::Url;

use super::AppConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["ivy-swap.toml", "config/ivy-swap.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("解析配置 {path} 失败: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("配置非法: {0}")]
    Invalid(String),
}

pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let explicit = path.is_some();
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            validate(&config)?;
            return Ok(config);
        }
        if explicit {
            return Err(ConfigError::Io {
                path: candidate,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
    }

    Ok(AppConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: AppConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(config))
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let fees = &config.fees;
    if !(0.0..1.0).contains(&fees.beta) {
        return Err(ConfigError::Invalid(format!(
            "fees.beta 必须位于 [0, 1)，当前 {}",
            fees.beta
        )));
    }
    if fees.default_micro_lamports > fees.max_micro_lamports {
        return Err(ConfigError::Invalid(
            "fees.default_micro_lamports 不能超过 max_micro_lamports".to_string(),
        ));
    }
    let jupiter = &config.jupiter;
    let mut endpoints = vec![
        ("global.rpc_url", config.global.rpc_url.as_str()),
        ("jupiter.quote_url", jupiter.quote_url.as_str()),
        ("jupiter.swap_url", jupiter.swap_url.as_str()),
        ("jupiter.price_url", jupiter.price_url.as_str()),
    ];
    if let Some(helius) = fees.helius_rpc_url.as_deref() {
        endpoints.push(("fees.helius_rpc_url", helius));
    }
    for (field, value) in endpoints {
        Url::parse(value)
            .map_err(|err| ConfigError::Invalid(format!("{field} 不是合法 URL ({value}): {err}")))?;
    }
    let cache = &config.cache;
    if cache.slot_update_ms > cache.slot_expiry_ms
        || cache.blockhash_update_ms > cache.blockhash_expiry_ms
    {
        return Err(ConfigError::Invalid(
            "cache 更新间隔不能大于过期时间".to_string(),
        ));
    }
    Ok(())
}

impl AppConfig {
    /// IVY 程序地址为必填项，仅在需要组装交易时检查。
    pub fn require_program_id(&self) -> Result<Pubkey, ConfigError> {
        self.ivy
            .program_id
            .ok_or_else(|| ConfigError::Invalid("缺少 ivy.program_id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(Some(dir.path().join("absent.toml"))).expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn rejects_inverted_cache_intervals() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[cache]\nslot_update_ms = 9000\nslot_expiry_ms = 5000").unwrap();
        let err = load_config(Some(file.path().to_path_buf())).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[jupiter]\nquote_url = \"not a url\"").unwrap();
        let err = load_config(Some(file.path().to_path_buf())).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("jupiter.quote_url")));
    }

    #[test]
    fn loads_file_and_requires_program_id() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[fees]\nbeta = 0.5").unwrap();
        let config = load_config(Some(file.path().to_path_buf())).expect("load");
        assert_eq!(config.fees.beta, 0.5);
        assert!(matches!(
            config.require_program_id(),
            Err(ConfigError::Invalid(_))
        ));
    }
}
