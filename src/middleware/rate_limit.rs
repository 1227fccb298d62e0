use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    cache::{
        CounterStore, KeyTtl, RateLimitKey, RateLimitPolicy, RateLimitResult, keys::rate_limit_key,
    },
    error::StoreError,
    utils::{Clock, SystemClock},
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// 固定窗口限流器
///
/// 计数完全交给共享存储，进程内不保存任何计数。窗口边界处的突发
/// 请求最多可达两倍配额。
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 计入一次请求并给出准入结果；存储不可用时放行
    pub async fn check(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitResult {
        match self.count_request(key, policy).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Counter store unavailable, admitting request without rate limiting"
                );
                RateLimitResult::fail_open(policy, self.clock.now_millis())
            }
        }
    }

    async fn count_request(
        &self,
        key: &RateLimitKey,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, StoreError> {
        let store_key = rate_limit_key(key);

        let count = self.store.increment(&store_key).await?;
        if count == 1 {
            // 只有开启窗口的请求设置过期时间
            self.store
                .set_expiry(&store_key, policy.window_secs())
                .await?;
        }

        let ttl_secs = match self.store.time_to_live(&store_key).await? {
            KeyTtl::Expires(secs) => secs,
            KeyTtl::Persistent => {
                // 上次 EXPIRE 失败，计数器不会自行过期
                tracing::warn!(key = %key, "Counter without expiry, restoring window");
                self.store
                    .set_expiry(&store_key, policy.window_secs())
                    .await?;
                policy.window_secs()
            }
            KeyTtl::Missing => policy.window_secs(),
        };

        Ok(RateLimitResult::counted(
            policy,
            count,
            self.clock.now_millis(),
            ttl_secs,
        ))
    }
}

/// 写入 `X-RateLimit-*` 响应头
pub fn annotate_headers(result: &RateLimitResult, headers: &mut HeaderMap) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_at));
}
