use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

static EXPORTER: OnceCell<()> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn try_init_prometheus(listen: &str) -> Result<()> {
    EXPORTER
        .get_or_try_init(|| {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("prometheus 监听地址非法: {listen}"))?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("安装 prometheus exporter 失败")?;
            PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
            Ok(())
        })
        .map(|_| ())
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}

/// `outcome`: quoted / no_liquidity / invalid / cancelled
pub fn record_quote_outcome(outcome: &'static str, route: &'static str) {
    if !prometheus_enabled() {
        return;
    }
    counter!("ivy_swap_quote_total", "outcome" => outcome, "route" => route).increment(1);
}

pub fn record_compose_outcome(instruction: &'static str, success: bool, elapsed_ms: f64) {
    if !prometheus_enabled() {
        return;
    }
    let status = if success { "success" } else { "error" };
    counter!(
        "ivy_swap_compose_total",
        "instruction" => instruction,
        "status" => status
    )
    .increment(1);
    histogram!("ivy_swap_compose_latency_ms", "instruction" => instruction).record(elapsed_ms);
}
