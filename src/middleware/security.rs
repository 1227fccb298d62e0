use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use tracing::Instrument;
use uuid::Uuid;

use super::{IdentityProvider, RateLimiter, annotate_headers};
use crate::{
    cache::{Caller, RateLimitKey, RateLimitPolicy},
    error::AppError,
};

/// 单条路由的准入配置
#[derive(Debug, Clone)]
pub struct SecurityOptions {
    /// 为 true 时必须是已认证用户
    pub protected: bool,
    /// 路由类别，参与限流键的组成
    pub namespace: String,
    pub policy: RateLimitPolicy,
}

impl SecurityOptions {
    pub fn protected(namespace: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            protected: true,
            namespace: namespace.into(),
            policy,
        }
    }

    pub fn public(namespace: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            protected: false,
            namespace: namespace.into(),
            policy,
        }
    }
}

/// 认证与限流的共享依赖，进程启动时创建一次
#[derive(Clone)]
pub struct Security {
    limiter: Arc<RateLimiter>,
    identity: Arc<dyn IdentityProvider>,
    trust_proxy_headers: bool,
}

impl Security {
    pub fn new(limiter: Arc<RateLimiter>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            limiter,
            identity,
            trust_proxy_headers: false,
        }
    }

    /// 是否信任 `X-Real-IP` / `X-Forwarded-For`
    ///
    /// 默认关闭。这两个头由客户端随意填写，只有在会覆盖它们的反向代理之后
    /// 才能开启，否则换个头就能拿到新的配额。
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn guard(&self, options: SecurityOptions) -> RouteGuard {
        RouteGuard {
            security: self.clone(),
            options: Arc::new(options),
        }
    }

    pub fn wrap<S>(&self, route: MethodRouter<S>, options: SecurityOptions) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        with_security(route, self.guard(options))
    }
}

/// 绑定到某条路由的准入检查
#[derive(Clone)]
pub struct RouteGuard {
    security: Security,
    options: Arc<SecurityOptions>,
}

impl RouteGuard {
    async fn admit(&self, mut req: Request<Body>, next: Next) -> Response {
        let caller = if self.options.protected {
            match self.security.identity.resolve(req.headers()).await {
                Some(identity) => {
                    let caller = Caller::User(identity.user_id.clone());
                    req.extensions_mut().insert(identity);
                    caller
                }
                None => {
                    // 未认证的请求不消耗配额
                    tracing::info!("Rejected unauthenticated request");
                    return AppError::Unauthorized.into_response();
                }
            }
        } else {
            Caller::Address(client_address(&req, self.security.trust_proxy_headers))
        };

        let key = RateLimitKey::new(&caller, &self.options.namespace);
        let result = self.security.limiter.check(&key, &self.options.policy).await;

        if !result.allowed {
            tracing::info!(
                caller = caller.kind(),
                key = %key,
                reset_at = result.reset_at,
                "Rate limit exceeded"
            );
            return AppError::RateLimited(result).into_response();
        }

        let mut response = next.run(req).await;
        annotate_headers(&result, response.headers_mut());
        response
    }
}

/// 用认证和限流包装一条路由，返回同样形态的路由
pub fn with_security<S>(route: MethodRouter<S>, guard: RouteGuard) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.layer(axum::middleware::from_fn_with_state(guard, security))
}

pub async fn security(State(guard): State<RouteGuard>, req: Request<Body>, next: Next) -> Response {
    let span = tracing::info_span!(
        "security",
        request_id = %Uuid::new_v4(),
        namespace = %guard.options.namespace,
        protected = guard.options.protected
    );
    guard.admit(req, next).instrument(span).await
}

/// 取客户端地址：代理头优先，其次是连接地址
fn client_address(req: &Request<Body>, trust_proxy_headers: bool) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let forwarded = trust_proxy_headers
        .then(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .filter(|ip| !ip.trim().is_empty())
                .or_else(|| {
                    req.headers()
                        .get("x-forwarded-for")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
                })
        })
        .flatten();

    forwarded
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}
