use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// 一类路由的限流策略，注册路由时创建，之后不再修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    limit: u32,
    window_secs: u64,
}

impl RateLimitPolicy {
    /// `limit` 为 0 表示始终拒绝；`window_secs` 必须大于 0
    pub fn new(limit: u32, window_secs: u64) -> Result<Self, ConfigError> {
        if window_secs == 0 {
            return Err(ConfigError::InvalidPolicy(
                "window must be at least one second".into(),
            ));
        }
        if i64::try_from(window_secs).is_err() {
            return Err(ConfigError::InvalidPolicy(format!(
                "window of {} seconds is out of range",
                window_secs
            )));
        }
        Ok(Self { limit, window_secs })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// 窗口内第 `count` 次请求的剩余配额
    pub fn remaining_after(&self, count: u64) -> u32 {
        u64::from(self.limit).saturating_sub(count) as u32
    }

    pub fn admits(&self, count: u64) -> bool {
        count <= u64::from(self.limit)
    }
}

/// 单次准入检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// 窗口重置时间，Unix 毫秒
    pub reset_at: i64,
    /// 距离窗口重置的毫秒数
    pub retry_after_ms: u64,
    /// 计数器存储不可用时放行的结果
    pub degraded: bool,
}

impl RateLimitResult {
    pub fn counted(policy: &RateLimitPolicy, count: u64, now_millis: i64, ttl_secs: u64) -> Self {
        let retry_after_ms = ttl_secs.saturating_mul(1000);
        Self {
            allowed: policy.admits(count),
            limit: policy.limit(),
            remaining: policy.remaining_after(count),
            reset_at: now_millis.saturating_add(retry_after_ms as i64),
            retry_after_ms,
            degraded: false,
        }
    }

    pub fn fail_open(policy: &RateLimitPolicy, now_millis: i64) -> Self {
        let retry_after_ms = policy.window_secs().saturating_mul(1000);
        Self {
            allowed: true,
            limit: policy.limit(),
            remaining: policy.limit(),
            reset_at: now_millis.saturating_add(retry_after_ms as i64),
            retry_after_ms,
            degraded: true,
        }
    }

    /// 向上取整的秒数，用于 Retry-After
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_ms.div_ceil(1000)
    }
}

/// 计数器剩余存活时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Expires(u64),
    /// 键存在但没有设置过期时间
    Persistent,
    /// 键不存在
    Missing,
}

impl KeyTtl {
    /// 按 Redis TTL 命令的返回值解析
    pub fn from_redis(ttl: i64) -> Option<Self> {
        match ttl {
            -2 => Some(KeyTtl::Missing),
            -1 => Some(KeyTtl::Persistent),
            secs if secs >= 0 => Some(KeyTtl::Expires(secs as u64)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(
            RateLimitPolicy::new(10, 0),
            Err(ConfigError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn zero_limit_is_a_valid_deny_all_policy() {
        let policy = RateLimitPolicy::new(0, 60).unwrap();
        assert!(!policy.admits(1));
        assert_eq!(policy.remaining_after(1), 0);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let policy = RateLimitPolicy::new(3, 60).unwrap();
        let remaining: Vec<u32> = (1..=6).map(|n| policy.remaining_after(n)).collect();
        assert_eq!(remaining, vec![2, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn redis_ttl_sentinels() {
        assert_eq!(KeyTtl::from_redis(-2), Some(KeyTtl::Missing));
        assert_eq!(KeyTtl::from_redis(-1), Some(KeyTtl::Persistent));
        assert_eq!(KeyTtl::from_redis(59), Some(KeyTtl::Expires(59)));
        assert_eq!(KeyTtl::from_redis(-7), None);
    }

    #[test]
    fn fail_open_grants_full_quota() {
        let policy = RateLimitPolicy::new(5, 60).unwrap();
        let result = RateLimitResult::fail_open(&policy, 1_000);
        assert!(result.allowed && result.degraded);
        assert_eq!(result.remaining, 5);
        assert_eq!(result.reset_at, 61_000);
    }
}
