use std::borrow::Cow;
use std::future::Future;

use tracing::Level;

use super::types::{LatencyGuard, LatencyMetadata};

pub fn guard_with_level(
    operation: impl Into<Cow<'static, str>>,
    level: Level,
    metadata: LatencyMetadata,
) -> LatencyGuard {
    LatencyGuard::new(operation, level, metadata)
}

/// 包裹一个 future，结束时按指定级别记录耗时。
pub async fn measure_future<Fut, T>(
    operation: impl Into<Cow<'static, str>>,
    level: Level,
    metadata: LatencyMetadata,
    fut: Fut,
) -> T
where
    Fut: Future<Output = T>,
{
    let guard = LatencyGuard::new(operation, level, metadata);
    let output = fut.await;
    guard.finish();
    output
}
