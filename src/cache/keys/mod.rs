/// 缓存键模块
/// 提供限流键的生成函数

pub mod rate_limit_keys;

pub use rate_limit_keys::{Caller, RateLimitKey, rate_limit_key};
