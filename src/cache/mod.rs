// 缓存模块
// 包含限流计数器的键、数据结构和存储操作

pub mod keys;
pub mod models;
pub mod operations;

pub use keys::{Caller, RateLimitKey};
pub use models::{KeyTtl, RateLimitPolicy, RateLimitResult};
pub use operations::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreOptions};
