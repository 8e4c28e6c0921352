use axum::{extract::State, http::StatusCode, response::Json};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::CurrentUser,
    services::commerce::{CheckoutInput, CheckoutResult},
    ApiResponse, AppState,
};

/// Turns the caller's cart into an order and starts payment.
///
/// The order is created even when the gateway call fails; the response then
/// carries `payment_initiation.success = false` and the failure redirect.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Checkout",
    request_body = CheckoutInput,
    params(("x-user-id" = Uuid, Header, description = "Customer id")),
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<CheckoutResult>),
        (status = 400, description = "Empty cart or invalid contact details", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough tickets left", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResult>>), ServiceError> {
    let result = state
        .services
        .checkout
        .checkout(user.id(), input, &state.services.payments)
        .await?;

    let message = if result.payment_initiation.success {
        "Order placed; continue to payment"
    } else {
        "Order placed but payment could not be started"
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(result, message)),
    ))
}
