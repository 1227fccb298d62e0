use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    cache::models::RateLimitResult,
    middleware::annotate_headers,
    utils::{error_codes, error_to_api_response},
};

/// 接口层错误，直接转换为 HTTP 响应
#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    RateLimited(RateLimitResult),
    BadRequest(String),
}

#[derive(serde::Serialize)]
struct RateLimitedBody {
    remaining: u32,
    reset_at: i64,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "未授权访问".into()),
            )
                .into_response(),
            AppError::RateLimited(result) => {
                let mut body = error_to_api_response(
                    error_codes::RATE_LIMIT,
                    format!(
                        "请求过于频繁，请在{}秒后重试",
                        result.retry_after_secs()
                    ),
                );
                body.0.resp_data = Some(RateLimitedBody {
                    remaining: result.remaining,
                    reset_at: result.reset_at,
                });

                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                annotate_headers(&result, response.headers_mut());
                if let Ok(value) = HeaderValue::from_str(&result.retry_after_secs().to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                error_to_api_response::<()>(error_codes::VALIDATION_ERROR, msg),
            )
                .into_response(),
        }
    }
}

/// 计数器存储错误，限流器据此放行请求
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store is not configured")]
    NotConfigured,

    #[error("counter store is unavailable")]
    Unavailable,

    #[error("counter store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("counter store is cooling down after repeated connection failures")]
    CoolingDown,

    #[error("counter store returned unexpected value: {0}")]
    UnexpectedValue(i64),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 配置错误，只在启动或路由注册时出现
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid rate limit policy: {0}")]
    InvalidPolicy(String),
}
