use axum::{Extension, body::Bytes, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::{middleware::Identity, utils::success_to_api_response};

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeAccepted {
    pub user_id: String,
    pub query: String,
}

/// AI 分析入口；生成逻辑由外部助手平台完成
pub async fn analyze(Extension(identity): Extension<Identity>, body: Bytes) -> impl IntoResponse {
    // 请求体缺失或不是 JSON 时按默认查询处理
    let req: AnalyzeRequest = serde_json::from_slice(&body).unwrap_or_default();
    let query = req
        .query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| "General overview".to_string());

    tracing::info!(user_id = %identity.user_id, "Accepted insight request");

    success_to_api_response(AnalyzeAccepted {
        user_id: identity.user_id,
        query,
    })
}
