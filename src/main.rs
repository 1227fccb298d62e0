use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{Router, routing::get};
use finance_gate::{
    AppState,
    cache::RedisCounterStore,
    config::Config,
    middleware::{JwtIdentityProvider, RateLimiter, Security, log_errors},
    routes,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // 计数器存储，首次使用时才连接，Redis 不可用不影响启动
    let store = Arc::new(RedisCounterStore::open(
        &config.redis_url,
        config.store_options(),
    ));

    let identity = Arc::new(JwtIdentityProvider::new(
        &config.jwt_secret,
        config.jwt_audience.as_deref(),
    ));
    let security = Security::new(Arc::new(RateLimiter::new(store.clone())), identity)
        .trust_proxy_headers(config.trust_proxy_headers);

    let state = AppState {
        config: config.clone(),
        security,
    };

    let api: Router<AppState> = routes::api_router(&state.security, &state.config.policies);
    let router: Router<AppState> = Router::new().route("/health", get(|| async { "ok" }));
    let router = if config.api_base_uri.is_empty() {
        router.merge(api)
    } else {
        router.nest(&config.api_base_uri, api)
    };
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
    }

    store.close().await;
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
