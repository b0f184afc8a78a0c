//! 最新请求优先的版本化槽位：只有最新一次发起的请求可以写入结果。

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// 某次请求的版本号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct RequestSlot<K, V> {
    latest: AtomicU64,
    entry: Mutex<Option<(K, V)>>,
}

impl<K, V> Default for RequestSlot<K, V> {
    fn default() -> Self {
        Self {
            latest: AtomicU64::new(0),
            entry: Mutex::new(None),
        }
    }
}

impl<K, V> RequestSlot<K, V>
where
    K: PartialEq,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 命中相同键时直接返回缓存值。
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entry
            .lock()
            .as_ref()
            .filter(|(cached, _)| cached == key)
            .map(|(_, value)| value.clone())
    }

    /// 发起新请求：清空槽位并分配更高的版本号，之前的请求全部失效。
    pub fn begin(&self) -> RequestTicket {
        let mut entry = self.entry.lock();
        *entry = None;
        RequestTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// 仅当 `ticket` 仍是最新版本时写入，返回是否生效。
    pub fn publish(&self, ticket: RequestTicket, key: K, value: V) -> bool {
        let mut entry = self.entry.lock();
        if !self.is_current(ticket) {
            return false;
        }
        *entry = Some((key, value));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_ticket_publishes() {
        let slot: RequestSlot<u32, &'static str> = RequestSlot::new();
        let first = slot.begin();
        let second = slot.begin();
        assert!(!slot.is_current(first));
        assert!(slot.publish(second, 2, "second"));
        assert!(!slot.publish(first, 1, "first"));
        assert_eq!(slot.lookup(&2), Some("second"));
        assert_eq!(slot.lookup(&1), None);
    }

    #[test]
    fn begin_clears_previous_value() {
        let slot: RequestSlot<u32, u32> = RequestSlot::new();
        let ticket = slot.begin();
        assert!(slot.publish(ticket, 7, 70));
        assert_eq!(slot.lookup(&7), Some(70));
        let _next = slot.begin();
        assert_eq!(slot.lookup(&7), None);
        assert!(!slot.publish(ticket, 7, 71));
    }
}
