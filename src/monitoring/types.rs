use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Level;

/// 附加在耗时日志上的键值对。
#[derive(Debug, Clone, Default)]
pub struct LatencyMetadata {
    fields: Arc<BTreeMap<&'static str, String>>,
}

impl LatencyMetadata {
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<String>,
    {
        Self {
            fields: Arc::new(
                pairs
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }

    fn summary(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// 作用域耗时守卫：`finish` 或析构时输出一次耗时日志。
#[derive(Debug)]
pub struct LatencyGuard {
    operation: Cow<'static, str>,
    start: Instant,
    level: Level,
    metadata: LatencyMetadata,
    ended: bool,
}

impl LatencyGuard {
    pub fn new(
        operation: impl Into<Cow<'static, str>>,
        level: Level,
        metadata: LatencyMetadata,
    ) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
            level,
            metadata,
            ended: false,
        }
    }

    pub fn finish(mut self) -> Duration {
        self.emit()
    }

    fn emit(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.ended {
            self.ended = true;
            log_latency(self.level, &self.operation, elapsed, &self.metadata);
        }
        elapsed
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        self.emit();
    }
}

fn log_latency(level: Level, operation: &str, elapsed: Duration, metadata: &LatencyMetadata) {
    let elapsed_ms = format!("{:.3}", elapsed.as_secs_f64() * 1_000.0);
    let metadata = metadata.summary().unwrap_or_default();

    macro_rules! log_event {
        ($macro:ident) => {
            tracing::$macro!(
                target: "latency",
                %operation,
                elapsed_ms = %elapsed_ms,
                metadata = %metadata,
                "耗时统计"
            )
        };
    }

    match level {
        Level::ERROR => log_event!(error),
        Level::WARN => log_event!(warn),
        Level::INFO => log_event!(info),
        Level::DEBUG => log_event!(debug),
        Level::TRACE => log_event!(trace),
    }
}
