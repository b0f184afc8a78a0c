//! 带新鲜度状态的单值缓存。
//!
//! 值的年龄不超过 `update` 时直接返回；不超过 `expiry` 时返回旧值并在后台刷新；
//! 超过 `expiry` 则丢弃旧值、作废后台刷新，由前台重新拉取。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

pub type FetchFuture<T> = BoxFuture<'static, anyhow::Result<T>>;
pub type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FreshnessError>>>;

#[derive(Debug, Clone, Error)]
pub enum FreshnessError {
    #[error("拉取 {name} 失败: {message}")]
    Fetch { name: &'static str, message: String },
    #[error("拉取 {name} 的任务中断: {message}")]
    Aborted { name: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessState {
    Empty,
    Loading,
    Fresh,
    Stale,
    Expired,
}

struct Slot<T> {
    value: Option<(T, Instant)>,
    loading: Option<(u64, SharedFetch<T>)>,
    refreshing: Option<u64>,
    next_id: u64,
}

impl<T> Slot<T> {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner<T> {
    name: &'static str,
    fetcher: Fetcher<T>,
    update: Option<Duration>,
    expiry: Option<Duration>,
    slot: Mutex<Slot<T>>,
}

pub struct FreshnessCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FreshnessCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for FreshnessCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessCache")
            .field("name", &self.inner.name)
            .field("update", &self.inner.update)
            .field("expiry", &self.inner.expiry)
            .finish()
    }
}

impl<T> FreshnessCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `update` 为 `None` 时值永不过时；`expiry` 为 `None` 时旧值永不丢弃。
    pub fn new(
        name: &'static str,
        fetcher: Fetcher<T>,
        update: Option<Duration>,
        expiry: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                fetcher,
                update,
                expiry,
                slot: Mutex::new(Slot {
                    value: None,
                    loading: None,
                    refreshing: None,
                    next_id: 0,
                }),
            }),
        }
    }

    /// 只拉取一次，之后一直视为新鲜。
    pub fn once(name: &'static str, fetcher: Fetcher<T>) -> Self {
        Self::new(name, fetcher, None, None)
    }

    pub fn state(&self) -> FreshnessState {
        let slot = self.inner.slot.lock();
        if slot.loading.is_some() {
            return FreshnessState::Loading;
        }
        match &slot.value {
            None => FreshnessState::Empty,
            Some((_, fetched_at)) => self.classify(fetched_at.elapsed()),
        }
    }

    pub async fn get(&self) -> Result<T, FreshnessError> {
        let pending = {
            let mut slot = self.inner.slot.lock();
            if let Some((value, fetched_at)) = &slot.value {
                match self.classify(fetched_at.elapsed()) {
                    FreshnessState::Fresh => return Ok(value.clone()),
                    FreshnessState::Stale => {
                        let value = value.clone();
                        if slot.refreshing.is_none() {
                            let id = slot.allocate();
                            slot.refreshing = Some(id);
                            self.spawn_background(id);
                        }
                        return Ok(value);
                    }
                    _ => {
                        trace!(
                            target: "cache::freshness",
                            name = self.inner.name,
                            "缓存值已过期，丢弃并前台重新拉取"
                        );
                        slot.value = None;
                        slot.refreshing = None;
                    }
                }
            }
            match &slot.loading {
                Some((_, shared)) => shared.clone(),
                None => {
                    let id = slot.allocate();
                    let shared = self.spawn_foreground(id);
                    slot.loading = Some((id, shared.clone()));
                    shared
                }
            }
        };
        pending.await
    }

    fn classify(&self, age: Duration) -> FreshnessState {
        if self.inner.update.is_none_or(|update| age <= update) {
            FreshnessState::Fresh
        } else if self.inner.expiry.is_none_or(|expiry| age <= expiry) {
            FreshnessState::Stale
        } else {
            FreshnessState::Expired
        }
    }

    /// 前台拉取在独立任务中执行，调用方被取消也不会卡住 Loading 状态。
    fn spawn_foreground(&self, id: u64) -> SharedFetch<T> {
        let inner = self.inner.clone();
        let name = inner.name;
        let handle = tokio::spawn(async move {
            let result = (inner.fetcher)().await;
            let mut slot = inner.slot.lock();
            let owns_slot = matches!(&slot.loading, Some((current, _)) if *current == id);
            match result {
                Ok(value) => {
                    if owns_slot {
                        slot.loading = None;
                        slot.value = Some((value.clone(), Instant::now()));
                    }
                    Ok(value)
                }
                Err(err) => {
                    if owns_slot {
                        slot.loading = None;
                        slot.value = None;
                    }
                    debug!(
                        target: "cache::freshness",
                        name = inner.name,
                        error = %err,
                        "前台拉取失败，缓存重置为空"
                    );
                    Err(FreshnessError::Fetch {
                        name: inner.name,
                        message: format!("{err:#}"),
                    })
                }
            }
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(FreshnessError::Aborted {
                    name,
                    message: join_err.to_string(),
                }),
            }
        }
        .boxed()
        .shared()
    }

    fn spawn_background(&self, id: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = (inner.fetcher)().await;
            let mut slot = inner.slot.lock();
            if slot.refreshing != Some(id) {
                trace!(
                    target: "cache::freshness",
                    name = inner.name,
                    "后台刷新已作废，忽略结果"
                );
                return;
            }
            slot.refreshing = None;
            match result {
                Ok(value) => {
                    slot.value = Some((value, Instant::now()));
                }
                Err(err) => {
                    debug!(
                        target: "cache::freshness",
                        name = inner.name,
                        error = %err,
                        "后台刷新失败，保留旧值"
                    );
                }
            }
        });
    }
}
