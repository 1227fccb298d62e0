use axum::{http::header, response::IntoResponse};
use serde::Serialize;

use crate::utils::success_to_api_response;

#[derive(Debug, Serialize)]
pub struct UpdateItem {
    pub id: String,
    pub title: String,
    pub source: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatesResponse {
    pub updates: Vec<UpdateItem>,
}

/// 监管动态，公开访问，允许 CDN 缓存一小时
pub async fn list_updates() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "s-maxage=3600, stale-while-revalidate")],
        success_to_api_response(UpdatesResponse {
            updates: Vec::new(),
        }),
    )
}
