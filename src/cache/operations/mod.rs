/// 缓存操作
/// 计数器存储接口及其实现

use async_trait::async_trait;

use crate::{cache::models::KeyTtl, error::StoreError};

pub mod memory;
pub mod rate_limit;

pub use memory::MemoryCounterStore;
pub use rate_limit::{RedisCounterStore, StoreOptions};

/// 共享计数器存储
///
/// 实现必须保证 `increment` 对同一个键的并发调用是原子的，
/// 并返回自增后的值。
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 自增计数器，键不存在时从 0 开始
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// 设置或刷新过期时间
    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), StoreError>;

    /// 查询剩余存活时间
    async fn time_to_live(&self, key: &str) -> Result<KeyTtl, StoreError>;
}
