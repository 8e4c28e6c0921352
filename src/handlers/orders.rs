use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    handlers::common::CurrentUser,
    services::{
        orders::{OrderDetails, OrderListQuery, OrderListResponse},
        payments::PaymentInitiation,
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "The caller's orders, newest first",
    params(
        OrderListQuery,
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<OrderListResponse> {
    let orders = state.services.orders.list_orders(user.id(), query).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    summary = "Get order",
    params(
        ("order_number" = String, Path, description = "Order number, e.g. TIX-20241001-1A2B3C4D"),
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Order with items and payment", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_number): Path<String>,
) -> ApiResult<OrderDetails> {
    let details = state
        .services
        .orders
        .get_order(user.id(), &order_number)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_number}/cancel",
    summary = "Cancel order",
    description = "Cancels a pending order and returns its tickets to stock",
    params(
        ("order_number" = String, Path, description = "Order number"),
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already paid or refunded", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_number): Path<String>,
) -> ApiResult<OrderDetails> {
    let details = state
        .services
        .orders
        .cancel_order(user.id(), &order_number)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        details,
        "Order cancelled",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_number}/pay",
    summary = "Retry payment",
    description = "Requests a new charge for a pending order",
    params(
        ("order_number" = String, Path, description = "Order number"),
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Payment initiation result", body = ApiResponse<PaymentInitiation>),
        (status = 400, description = "Order is not pending", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn pay_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_number): Path<String>,
) -> ApiResult<PaymentInitiation> {
    let initiation = state
        .services
        .payments
        .initiate_payment(user.id(), &order_number)
        .await?;
    Ok(Json(ApiResponse::success(initiation)))
}
