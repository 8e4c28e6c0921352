//! Wisata ticket marketplace API
//!
//! Ticket catalog, per-customer carts, checkout into immutable orders, and
//! payment gateway integration with callback-driven order status updates.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod middleware_helpers;
#[allow(elided_lifetimes_in_paths)]
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service on top of one connection pool and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: Arc<events::EventSender>,
        gateway: Arc<dyn gateway::PaymentGateway>,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), config.clone(), gateway);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{commerce, orders, payment_webhooks};

    Router::new()
        .route(
            "/tickets",
            get(commerce::tickets::list_tickets).post(commerce::tickets::create_ticket),
        )
        .route(
            "/tickets/:id",
            get(commerce::tickets::get_ticket).patch(commerce::tickets::update_ticket),
        )
        .route(
            "/cart",
            get(commerce::carts::get_cart).delete(commerce::carts::clear_cart),
        )
        .route("/cart/items", post(commerce::carts::add_cart_item))
        .route(
            "/cart/items/:item_id",
            put(commerce::carts::update_cart_item).delete(commerce::carts::remove_cart_item),
        )
        .route("/checkout", post(commerce::checkout::checkout))
        .route("/orders", get(orders::list_orders))
        .route("/orders/:order_number", get(orders::get_order))
        .route("/orders/:order_number/cancel", post(orders::cancel_order))
        .route("/orders/:order_number/pay", post(orders::pay_order))
        .route(
            "/payments/callback",
            post(payment_webhooks::payment_callback),
        )
}

/// Full application router: API, health, status and docs, with request-id,
/// tracing and compression layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_routes())
        .fallback(not_found)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

async fn not_found() -> errors::ServiceError {
    errors::ServiceError::NotFound("route not found".to_string())
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> Response {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "database health check failed");
            "unhealthy"
        }
    };

    let healthy = db_status == "healthy";
    let health_data = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": { "database": db_status },
        "timestamp": Utc::now().to_rfc3339(),
    });

    if healthy {
        (StatusCode::OK, Json(ApiResponse::success(health_data))).into_response()
    } else {
        let body = ApiResponse {
            data: Some(health_data),
            ..ApiResponse::error("database unavailable".to_string())
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}
