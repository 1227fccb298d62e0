use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::CounterStore;
use crate::{cache::models::KeyTtl, error::StoreError, utils::Clock};

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<i64>,
}

impl Counter {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内计数器存储
///
/// 仅用于测试和本地开发。多实例部署时各进程的计数互不可见，
/// 不能替代 Redis。
pub struct MemoryCounterStore {
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<String, Counter>>,
    available: AtomicBool,
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// 模拟存储宕机或恢复
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 当前窗口内的计数，不计入请求
    pub async fn count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        let counters = self.counters.lock().await;
        counters
            .get(key)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.count)
    }

    /// 当前存活的计数器数量
    pub async fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let counters = self.counters.lock().await;
        counters.values().filter(|c| !c.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now_millis();

        let mut counters = self.counters.lock().await;
        let counter = counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: None,
        });
        if counter.is_expired(now) {
            *counter = Counter {
                count: 0,
                expires_at: None,
            };
        }
        counter.count += 1;
        Ok(counter.count)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        self.ensure_available()?;
        let now = self.clock.now_millis();

        let mut counters = self.counters.lock().await;
        if let Some(counter) = counters.get_mut(key).filter(|c| !c.is_expired(now)) {
            counter.expires_at = Some(now.saturating_add(seconds.saturating_mul(1000) as i64));
        }
        Ok(())
    }

    async fn time_to_live(&self, key: &str) -> Result<KeyTtl, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now_millis();

        let counters = self.counters.lock().await;
        let ttl = match counters.get(key) {
            None => KeyTtl::Missing,
            Some(c) if c.is_expired(now) => KeyTtl::Missing,
            Some(Counter {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Counter {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(((at - now) as u64).div_ceil(1000)),
        };
        Ok(ttl)
    }
}
