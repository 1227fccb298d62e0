use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    config::RoutePolicies,
    middleware::{Security, SecurityOptions},
};

pub mod insights;
pub mod payments;
pub mod updates;

/// 各路由类别的限流命名空间
pub mod namespaces {
    pub const AI_ANALYZE: &str = "ai-analyze";
    pub const EXTERNAL_UPDATES: &str = "external-updates";
    pub const PAYMENT_CREATE_ORDER: &str = "payment-create-order";
    pub const PAYMENT_VERIFY: &str = "payment-verify";
}

/// 组装受准入控制的接口路由
pub fn api_router<S>(security: &Security, policies: &RoutePolicies) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/ai/analyze",
            security.wrap(
                post(insights::analyze),
                SecurityOptions::protected(namespaces::AI_ANALYZE, policies.ai),
            ),
        )
        .route(
            "/external/updates",
            security.wrap(
                get(updates::list_updates),
                SecurityOptions::public(namespaces::EXTERNAL_UPDATES, policies.updates),
            ),
        )
        .route(
            "/razorpay/create-order",
            security.wrap(
                post(payments::create_order),
                SecurityOptions::protected(namespaces::PAYMENT_CREATE_ORDER, policies.payment),
            ),
        )
        .route(
            "/razorpay/verify-payment",
            security.wrap(
                post(payments::verify_payment),
                SecurityOptions::protected(namespaces::PAYMENT_VERIFY, policies.payment),
            ),
        )
}
