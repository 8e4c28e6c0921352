use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use crate::{
    errors::ServiceError,
    gateway::GatewayCallback,
    services::payments::CallbackOutcome,
    ApiResponse, ApiResult, AppState,
};

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

// POST /api/v1/payments/callback
#[utoipa::path(
    post,
    path = "/api/v1/payments/callback",
    summary = "Payment gateway callback",
    description = "Status notification from the payment processor. Signed with HMAC-SHA256 when a webhook secret is configured.",
    request_body = GatewayCallback,
    responses(
        (status = 200, description = "Callback applied", body = ApiResponse<CallbackOutcome>),
        (status = 400, description = "Invalid payload, unknown status or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal status transition", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<CallbackOutcome> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let tolerance = state.config.webhook_tolerance_secs();
        if !verify_signature(&headers, &body, secret, tolerance, Utc::now().timestamp()) {
            warn!("Payment callback signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let callback: GatewayCallback = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid callback payload: {}", e)))?;

    info!(
        order_number = %callback.order_id,
        status = %callback.status,
        "Payment callback received"
    );

    let outcome = state.services.payments.handle_callback(callback).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Checks the callback signature against `secret`.
///
/// Accepts either `x-timestamp` + `x-signature` or a `Stripe-Signature`
/// header of the form `t=<unix>,v1=<hex>`. Both sign `"{timestamp}.{body}"`.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let Some((timestamp, signature)) = signature_parts(headers) else {
        return false;
    };

    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if now.abs_diff(ts) > tolerance_secs {
        return false;
    }

    match compute_signature(secret, &timestamp, payload) {
        Some(expected) => constant_time_eq(&expected, &signature),
        None => false,
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`
pub fn compute_signature(secret: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn signature_parts(headers: &HeaderMap) -> Option<(String, String)> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let (Some(ts), Some(sig)) = (header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER)) {
        return Some((ts.to_string(), sig.to_string()));
    }

    let stripe = header(STRIPE_SIGNATURE_HEADER)?;
    let mut ts = None;
    let mut v1 = None;
    for part in stripe.split(',') {
        match part.trim().split_once('=') {
            Some(("t", val)) => ts = Some(val),
            Some(("v1", val)) => v1 = Some(val),
            _ => {}
        }
    }
    Some((ts?.to_string(), v1?.to_string()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
