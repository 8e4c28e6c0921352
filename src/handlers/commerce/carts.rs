use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    handlers::common::CurrentUser,
    services::commerce::{AddToCartInput, CartWithItems, UpdateCartItemInput},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get cart",
    description = "The caller's cart; created empty on first access",
    params(("x-user-id" = Uuid, Header, description = "Customer id")),
    responses(
        (status = 200, description = "Cart with items", body = ApiResponse<CartWithItems>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: CurrentUser) -> ApiResult<CartWithItems> {
    let cart = state.services.cart.get_cart(user.id()).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add item to cart",
    request_body = AddToCartInput,
    params(("x-user-id" = Uuid, Header, description = "Customer id")),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartWithItems>),
        (status = 400, description = "Invalid quantity or visit date", body = crate::errors::ErrorResponse),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough tickets left", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<AddToCartInput>,
) -> ApiResult<CartWithItems> {
    let cart = state.services.cart.add_item(user.id(), input).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Update cart item",
    request_body = UpdateCartItemInput,
    params(
        ("item_id" = Uuid, Path, description = "Cart item id"),
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartWithItems>),
        (status = 400, description = "Quantity below 1", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not in the caller's cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough tickets left", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateCartItemInput>,
) -> ApiResult<CartWithItems> {
    let cart = state
        .services
        .cart
        .update_item(user.id(), item_id, input)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Remove cart item",
    params(
        ("item_id" = Uuid, Path, description = "Cart item id"),
        ("x-user-id" = Uuid, Header, description = "Customer id"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartWithItems>),
        (status = 404, description = "Item not in the caller's cart", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartWithItems> {
    let cart = state.services.cart.remove_item(user.id(), item_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Clear cart",
    params(("x-user-id" = Uuid, Header, description = "Customer id")),
    responses(
        (status = 200, description = "Emptied cart", body = ApiResponse<CartWithItems>),
    ),
    tag = "Cart"
)]
pub async fn clear_cart(State(state): State<AppState>, user: CurrentUser) -> ApiResult<CartWithItems> {
    let cart = state.services.cart.clear_cart(user.id()).await?;
    Ok(Json(ApiResponse::success_with_message(cart, "Cart cleared")))
}
