use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wisata API",
        version = "0.1.0",
        description = r#"
# Wisata Ticket Marketplace API

Sellers list tickets for cultural and tourism destinations; customers add them
to a cart, check out into an order and pay through the payment gateway.

## Caller identity

Authentication happens upstream. Customer and seller endpoints read the caller
from the `x-user-id` header (a UUID) and answer 401 when it is missing.

## Money

All amounts are Indonesian rupiah with no minor unit. Orders carry a 5%
platform fee on top of the ticket subtotal.

## Order lifecycle

`pending` → `paid` → `refunded`, or `pending` → `cancelled`. Status changes
come from gateway callbacks or customer cancellation.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Tickets", description = "Ticket catalog"),
        (name = "Cart", description = "Per-customer shopping cart"),
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order queries, cancellation and payment retry"),
        (name = "Payments", description = "Payment gateway callbacks")
    ),
    paths(
        crate::handlers::commerce::tickets::list_tickets,
        crate::handlers::commerce::tickets::create_ticket,
        crate::handlers::commerce::tickets::get_ticket,
        crate::handlers::commerce::tickets::update_ticket,

        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_cart_item,
        crate::handlers::commerce::carts::update_cart_item,
        crate::handlers::commerce::carts::remove_cart_item,
        crate::handlers::commerce::carts::clear_cart,

        crate::handlers::commerce::checkout::checkout,

        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::pay_order,

        crate::handlers::payment_webhooks::payment_callback,
    ),
    components(
        schemas(
            crate::entities::ticket::Model,
            crate::entities::cart::Model,
            crate::entities::cart_item::Model,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order_item::Model,
            crate::entities::payment::Model,
            crate::entities::payment::PaymentStatus,

            crate::services::commerce::CreateTicketInput,
            crate::services::commerce::UpdateTicketInput,
            crate::services::commerce::TicketPage,
            crate::services::commerce::AddToCartInput,
            crate::services::commerce::UpdateCartItemInput,
            crate::services::commerce::CartWithItems,
            crate::services::commerce::CheckoutInput,
            crate::services::commerce::CheckoutResult,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderListResponse,
            crate::services::payments::PaymentInitiation,
            crate::services::payments::CallbackOutcome,
            crate::gateway::GatewayCallback,

            crate::ResponseMeta,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

/// Swagger UI plus the raw OpenAPI document
pub fn swagger_routes() -> Router<AppState> {
    Router::new().merge(swagger_ui())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_marketplace_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("Wisata API"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/orders/{order_number}/pay"));
        assert!(json.contains("/api/v1/payments/callback"));
    }
}
