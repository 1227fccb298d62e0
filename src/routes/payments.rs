use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, middleware::Identity, utils::success_to_api_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: f64,
    pub recipient_vpa: Option<String>,
    pub recipient_name: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDraft {
    pub user_id: String,
    pub receipt: String,
    /// 金额，单位为派士
    pub amount: i64,
    pub currency: &'static str,
    pub recipient_vpa: String,
    pub recipient_name: String,
    pub note: String,
}

/// 生成支付网关下单参数
pub async fn create_order(
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(AppError::BadRequest("金额无效".into()));
    }

    Ok(success_to_api_response(OrderDraft {
        user_id: identity.user_id,
        receipt: format!("receipt_{}", chrono::Utc::now().timestamp_millis()),
        amount: (req.amount * 100.0).round() as i64,
        currency: "INR",
        recipient_vpa: req.recipient_vpa.unwrap_or_default(),
        recipient_name: req.recipient_name.unwrap_or_default(),
        note: req.note.unwrap_or_default(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerificationPending {
    pub user_id: String,
    pub payment_id: String,
    pub status: &'static str,
}

/// 受理支付校验；签名由支付网关侧校验
pub async fn verify_payment(
    Extension(identity): Extension<Identity>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let missing = [
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
    ]
    .iter()
    .any(|field| field.trim().is_empty());
    if missing {
        return Err(AppError::BadRequest("支付参数不完整".into()));
    }

    Ok((
        StatusCode::ACCEPTED,
        success_to_api_response(VerificationPending {
            user_id: identity.user_id,
            payment_id: req.razorpay_payment_id,
            status: "pending_verification",
        }),
    ))
}
