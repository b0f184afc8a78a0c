//! Jupiter 聚合器 API 封装：报价、交易构建与 USD 价格。

pub mod price;
pub mod quote;
pub mod swap;

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{JupiterConfig, LoggingConfig, LoggingProfile};
use crate::monitoring::{LatencyMetadata, guard_with_level, prometheus_enabled};

pub use price::PriceResponse;
pub use quote::{QuoteOptions, QuoteRequest, QuoteResponse};
pub use swap::{SwapBuilder, SwapRequest, SwapTransactionResponse};

#[derive(Debug, Error)]
pub enum JupiterError {
    #[error("Jupiter API 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求 {endpoint} 超时（{timeout_ms}ms）")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("响应解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("请求 {endpoint} 返回状态 {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("请求 {endpoint} 被限流，状态 {status}: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("Jupiter 响应结构不符合预期: {0}")]
    Schema(String),
}

impl JupiterError {
    pub fn describe(&self) -> String {
        use std::error::Error as _;
        let mut parts = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if parts.last() != Some(&text) {
                parts.push(text);
            }
            current = err.source();
        }
        parts.join(" | caused by: ")
    }
}

/// 报价与 USD 单价来源。
#[async_trait]
pub trait AggregatorSource: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, JupiterError>;

    /// 未知 mint 的单价为 0。
    async fn prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, Decimal>, JupiterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Quote,
    Swap,
    Price,
}

impl Stage {
    fn operation(self) -> &'static str {
        match self {
            Stage::Quote => "jupiter.quote",
            Stage::Swap => "jupiter.swap",
            Stage::Price => "jupiter.price",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Stage::Quote => "quote",
            Stage::Swap => "swap",
            Stage::Price => "price",
        }
    }
}

/// tracing 的 target 必须是字面量，按阶段分派。
macro_rules! stage_log {
    ($level:ident, $stage:expr, $($rest:tt)+) => {
        match $stage {
            Stage::Quote => $level!(target: "jupiter::quote", $($rest)+),
            Stage::Swap => $level!(target: "jupiter::swap", $($rest)+),
            Stage::Price => $level!(target: "jupiter::price", $($rest)+),
        }
    };
}

#[derive(Clone)]
pub struct JupiterApiClient {
    quote_url: String,
    swap_url: String,
    price_url: String,
    client: reqwest::Client,
    quote_timeout: Duration,
    swap_timeout: Duration,
    price_timeout: Duration,
    options: QuoteOptions,
    log_profile: LoggingProfile,
    slow_quote_warn_ms: u64,
    slow_swap_warn_ms: u64,
}

impl fmt::Debug for JupiterApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JupiterApiClient")
            .field("quote_url", &self.quote_url)
            .field("swap_url", &self.swap_url)
            .field("price_url", &self.price_url)
            .field("quote_timeout", &self.quote_timeout)
            .field("swap_timeout", &self.swap_timeout)
            .field("log_profile", &self.log_profile)
            .finish()
    }
}

impl JupiterApiClient {
    pub fn new(client: reqwest::Client, config: &JupiterConfig, logging: &LoggingConfig) -> Self {
        Self {
            quote_url: config.quote_url.clone(),
            swap_url: config.swap_url.clone(),
            price_url: config.price_url.clone(),
            client,
            quote_timeout: Duration::from_millis(config.quote_timeout_ms),
            swap_timeout: Duration::from_millis(config.swap_timeout_ms),
            price_timeout: Duration::from_millis(config.price_timeout_ms),
            options: QuoteOptions::from(config),
            log_profile: logging.profile,
            slow_quote_warn_ms: logging.slow_quote_warn_ms,
            slow_swap_warn_ms: logging.slow_swap_warn_ms,
        }
    }

    /// 配置中的报价参数，供各聚合器腿构造请求。
    pub fn quote_options(&self) -> &QuoteOptions {
        &self.options
    }

    pub async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, JupiterError> {
        trace!(
            target: "jupiter::quote",
            input_mint = %request.input_mint,
            output_mint = %request.output_mint,
            amount = request.amount,
            slippage_bps = request.slippage_bps,
            "开始请求 Jupiter 报价"
        );
        let params = request.to_query_params();
        let http = self
            .client
            .get(&self.quote_url)
            .timeout(self.quote_timeout)
            .query(&params);
        let (json, status) = self
            .execute(Stage::Quote, &self.quote_url, self.quote_timeout, http)
            .await?;
        let quote = QuoteResponse::try_from_value(json).map_err(|err| {
            self.record_metrics(Stage::Quote, "schema_error", None, Some(status));
            warn!(
                target: "jupiter::quote",
                endpoint = %self.quote_url,
                error = %err,
                "Jupiter 报价 schema 校验失败"
            );
            JupiterError::Schema(err.to_string())
        })?;
        debug!(
            target: "jupiter::quote",
            in_amount = quote.payload().in_amount,
            out_amount = quote.payload().out_amount,
            price_impact_pct = %quote.payload().price_impact_pct,
            "Jupiter 报价完成"
        );
        Ok(quote)
    }

    pub async fn fetch_swap(
        &self,
        user: &Pubkey,
        quote: &QuoteResponse,
    ) -> Result<SwapTransactionResponse, JupiterError> {
        let mut payload = serde_json::to_value(SwapRequest::for_composition(*user, quote))
            .map_err(|err| JupiterError::Schema(format!("序列化 swap 请求失败: {err}")))?;
        prune_nulls(&mut payload);
        trace!(
            target: "jupiter::swap",
            user = %user,
            "即将请求 Jupiter 构建交易"
        );
        let http = self
            .client
            .post(&self.swap_url)
            .timeout(self.swap_timeout)
            .json(&payload);
        let (json, status) = self
            .execute(Stage::Swap, &self.swap_url, self.swap_timeout, http)
            .await?;
        let response: SwapTransactionResponse = serde_json::from_value(json).map_err(|err| {
            self.record_metrics(Stage::Swap, "schema_error", None, Some(status));
            warn!(
                target: "jupiter::swap",
                endpoint = %self.swap_url,
                error = %err,
                "Jupiter 构建响应 schema 校验失败"
            );
            JupiterError::Schema(err.to_string())
        })?;
        debug!(
            target: "jupiter::swap",
            last_valid_block_height = response.last_valid_block_height,
            compute_unit_limit = ?response.compute_unit_limit,
            "Jupiter 交易构建完成"
        );
        Ok(response)
    }

    pub async fn fetch_prices(
        &self,
        mints: &[Pubkey],
    ) -> Result<HashMap<Pubkey, Decimal>, JupiterError> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }
        let http = self
            .client
            .get(&self.price_url)
            .timeout(self.price_timeout)
            .query(&[("list_address", price::list_address_param(mints))]);
        let (json, status) = self
            .execute(Stage::Price, &self.price_url, self.price_timeout, http)
            .await?;
        let response: PriceResponse = serde_json::from_value(json).map_err(|err| {
            self.record_metrics(Stage::Price, "schema_error", None, Some(status));
            JupiterError::Schema(err.to_string())
        })?;
        Ok(response.unit_prices(mints))
    }

    /// 统一处理超时、限流、非 200 与 JSON 解析，返回响应体与状态码。
    async fn execute(
        &self,
        stage: Stage,
        url: &str,
        timeout: Duration,
        request: reqwest::RequestBuilder,
    ) -> Result<(Value, StatusCode), JupiterError> {
        let metadata = LatencyMetadata::from_pairs([("stage", stage.label()), ("url", url)]);
        let guard = guard_with_level(stage.operation(), self.log_profile.latency_level(), metadata);
        let started = Instant::now();
        let timeout_ms = timeout.as_millis() as u64;

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                self.record_metrics(stage, "timeout", None, None);
                stage_log!(warn, stage, endpoint = %url, timeout_ms, "Jupiter 请求超时");
                JupiterError::Timeout {
                    endpoint: url.to_string(),
                    timeout_ms,
                    source: err,
                }
            } else {
                self.record_metrics(stage, "transport_error", None, None);
                stage_log!(warn, stage, endpoint = %url, error = %err, "Jupiter 请求发送失败");
                JupiterError::from(err)
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            if err.is_timeout() {
                self.record_metrics(stage, "timeout", None, Some(status));
                stage_log!(warn, stage, endpoint = %url, timeout_ms, "Jupiter 读取响应超时");
                JupiterError::Timeout {
                    endpoint: url.to_string(),
                    timeout_ms,
                    source: err,
                }
            } else {
                self.record_metrics(stage, "read_error", None, Some(status));
                stage_log!(warn, stage, endpoint = %url, error = %err, "Jupiter 读取响应失败");
                JupiterError::from(err)
            }
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let summary = summarize_error_body(body);
            self.record_metrics(stage, "rate_limited", None, Some(status));
            stage_log!(
                warn,
                stage,
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "Jupiter 请求命中限流"
            );
            return Err(JupiterError::RateLimited {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        if !status.is_success() {
            let summary = summarize_error_body(body);
            self.record_metrics(stage, "http_error", None, Some(status));
            stage_log!(
                warn,
                stage,
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "Jupiter 返回非 200 状态"
            );
            return Err(JupiterError::ApiStatus {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        let json: Value = serde_json::from_str(&body).map_err(|err| {
            self.record_metrics(stage, "decode_error", None, Some(status));
            stage_log!(warn, stage, endpoint = %url, error = %err, "Jupiter JSON 解析失败");
            JupiterError::Json(err)
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let threshold_ms = match stage {
            Stage::Swap => self.slow_swap_warn_ms,
            Stage::Quote | Stage::Price => self.slow_quote_warn_ms,
        };
        if elapsed_ms > threshold_ms as f64 {
            stage_log!(
                debug,
                stage,
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                threshold_ms,
                "Jupiter 请求耗时较长"
            );
        }

        self.record_metrics(stage, "success", Some(elapsed_ms), Some(status));
        guard.finish();
        Ok((json, status))
    }

    fn record_metrics(
        &self,
        stage: Stage,
        status: &'static str,
        elapsed_ms: Option<f64>,
        http_status: Option<StatusCode>,
    ) {
        if !prometheus_enabled() {
            return;
        }
        counter!(
            "ivy_swap_jupiter_requests_total",
            "stage" => stage.label(),
            "status" => status,
            "http_status" => http_status
                .map(|code| code.as_u16().to_string())
                .unwrap_or_else(|| "none".to_string())
        )
        .increment(1);
        if let Some(value) = elapsed_ms {
            histogram!(
                "ivy_swap_jupiter_latency_ms",
                "stage" => stage.label()
            )
            .record(value);
        }
    }
}

#[async_trait]
impl AggregatorSource for JupiterApiClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, JupiterError> {
        self.fetch_quote(request).await
    }

    async fn prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, Decimal>, JupiterError> {
        self.fetch_prices(mints).await
    }
}

#[async_trait]
impl SwapBuilder for JupiterApiClient {
    async fn build_swap(
        &self,
        user: &Pubkey,
        quote: &QuoteResponse,
    ) -> Result<SwapTransactionResponse, JupiterError> {
        self.fetch_swap(user, quote).await
    }
}

fn summarize_error_body(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response body)".to_string();
    }
    let mut single_line = trimmed.replace(['\n', '\r'], " ");
    const MAX_LEN: usize = 512;
    if single_line.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !single_line.is_char_boundary(cut) {
            cut -= 1;
        }
        single_line.truncate(cut);
        single_line.push('…');
    }
    single_line
}

fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, entry| {
                prune_nulls(entry);
                !entry.is_null()
            });
        }
        Value::Array(array) => {
            for item in array.iter_mut() {
                prune_nulls(item);
            }
            array.retain(|item| !item.is_null());
        }
        _ => {}
    }
}
