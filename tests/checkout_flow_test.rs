mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;
use wisata_api::{
    entities::{order::OrderStatus, payment::PaymentStatus},
    errors::ServiceError,
    services::{
        commerce::{AddToCartInput, CheckoutInput, UpdateTicketInput},
        orders::OrderListQuery,
    },
};

fn checkout_input() -> CheckoutInput {
    CheckoutInput {
        customer_name: "Sari Dewi".into(),
        customer_email: "sari@example.com".into(),
        customer_phone: "081234567890".into(),
        payment_method: "bank_transfer".into(),
        notes: Some("arriving by train".into()),
    }
}

async fn fill_cart(app: &TestApp, customer: Uuid, ticket_id: Uuid, quantity: i32) {
    app.state
        .services
        .cart
        .add_item(
            customer,
            AddToCartInput {
                ticket_id,
                quantity,
                visit_date: None,
                special_requests: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn checkout_freezes_the_cart_into_a_pending_order() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 10).await;
    fill_cart(&app, customer, ticket.id, 2).await;

    let services = &app.state.services;
    let result = services
        .checkout
        .checkout(customer, checkout_input(), &services.payments)
        .await
        .unwrap();

    let order = &result.order.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.order_number.starts_with("TIX-"));
    assert_eq!(order.subtotal, dec!(200000));
    assert_eq!(order.platform_fee, dec!(10000));
    assert_eq!(order.total_amount, dec!(210000));
    assert_eq!(order.currency, "IDR");

    assert_eq!(result.order.items.len(), 1);
    assert_eq!(result.order.items[0].ticket_name, "Candi Borobudur");
    assert_eq!(result.order.items[0].subtotal, dec!(200000));

    let payment = result.order.payment.as_ref().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, dec!(210000));
    assert!(payment.transaction_id.is_some());

    assert!(result.payment_initiation.success);
    assert_eq!(
        result.payment_initiation.redirect_url,
        format!("https://pay.test/{}", order.order_number)
    );

    assert_eq!(app.ticket_stock(ticket.id).await, 8);
    let cart = services.cart.get_cart(customer).await.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.subtotal, dec!(0));
}

#[tokio::test]
async fn charge_request_carries_fee_line_and_finish_url() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 10).await;
    fill_cart(&app, customer, ticket.id, 2).await;

    let services = &app.state.services;
    let result = services
        .checkout
        .checkout(customer, checkout_input(), &services.payments)
        .await
        .unwrap();

    let request = app.gateway.last_request().unwrap();
    assert_eq!(request.gross_amount, dec!(210000));
    assert_eq!(request.items.len(), 2);
    let items_total: rust_decimal::Decimal = request
        .items
        .iter()
        .map(|item| item.price * rust_decimal::Decimal::from(item.quantity))
        .sum();
    assert_eq!(items_total, request.gross_amount);
    assert_eq!(
        request.finish_url,
        format!(
            "https://shop.test/finish?order_number={}",
            result.order.order.order_number
        )
    );
}

#[tokio::test]
async fn gateway_failure_keeps_the_order_pending() {
    let app = TestApp::new().await;
    app.gateway.set_failing(true);
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 10).await;
    fill_cart(&app, customer, ticket.id, 1).await;

    let services = &app.state.services;
    let result = services
        .checkout
        .checkout(customer, checkout_input(), &services.payments)
        .await
        .unwrap();

    let order_number = result.order.order.order_number.clone();
    assert_eq!(result.order.order.status, OrderStatus::Pending);
    assert!(!result.payment_initiation.success);
    assert_eq!(
        result.payment_initiation.redirect_url,
        format!("https://shop.test/failed?order_number={}", order_number)
    );
    let payment = result.order.payment.unwrap();
    assert!(payment.failure_reason.unwrap().contains("gateway down"));
    assert_eq!(payment.status, PaymentStatus::Pending);

    // retry once the gateway is back
    app.gateway.set_failing(false);
    let retry = services
        .payments
        .initiate_payment(customer, &order_number)
        .await
        .unwrap();
    assert!(retry.success);
    assert_eq!(app.gateway.calls(), 2);

    let details = services.orders.get_order(customer, &order_number).await.unwrap();
    let payment = details.payment.unwrap();
    assert!(payment.failure_reason.is_none());
    assert_eq!(payment.transaction_id, retry.transaction_id);
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    app.state.services.cart.get_cart(customer).await.unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(customer, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("empty"));
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn invalid_contact_details_are_rejected() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 10).await;
    fill_cart(&app, customer, ticket.id, 1).await;

    let err = app
        .state
        .services
        .checkout
        .place_order(
            customer,
            CheckoutInput {
                customer_email: "not-an-email".into(),
                ..checkout_input()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .state
        .services
        .checkout
        .place_order(
            customer,
            CheckoutInput {
                customer_name: "   ".into(),
                ..checkout_input()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // nothing was written
    let cart = app.state.services.cart.get_cart(customer).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(app.ticket_stock(ticket.id).await, 10);
}

#[tokio::test]
async fn stock_shrinking_after_add_fails_checkout_atomically() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 5).await;
    fill_cart(&app, customer, ticket.id, 4).await;

    app.state
        .services
        .tickets
        .update_ticket(
            ticket.seller_id,
            ticket.id,
            UpdateTicketInput {
                stock: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(customer, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    assert_eq!(app.ticket_stock(ticket.id).await, 3);
    let cart = app.state.services.cart.get_cart(customer).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    let orders = app
        .state
        .services
        .orders
        .list_orders(customer, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(orders.total, 0);
}

#[tokio::test]
async fn order_keeps_cart_price_after_ticket_price_change() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 5).await;
    fill_cart(&app, customer, ticket.id, 1).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(customer, checkout_input())
        .await
        .unwrap();

    app.state
        .services
        .tickets
        .update_ticket(
            ticket.seller_id,
            ticket.id,
            UpdateTicketInput {
                price: Some(dec!(150000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reloaded = app
        .state
        .services
        .orders
        .get_order(customer, &order.order.order_number)
        .await
        .unwrap();
    assert_eq!(reloaded.items[0].unit_price, dec!(100000));
    assert_eq!(reloaded.order.total_amount, dec!(105000));
}

#[tokio::test]
async fn cancelling_restocks_and_is_idempotent() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 5).await;
    fill_cart(&app, customer, ticket.id, 2).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(customer, checkout_input())
        .await
        .unwrap();
    let number = order.order.order_number.clone();
    assert_eq!(app.ticket_stock(ticket.id).await, 3);

    let orders = &app.state.services.orders;
    let cancelled = orders.cancel_order(customer, &number).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(cancelled.payment.unwrap().status, PaymentStatus::Cancelled);
    assert_eq!(app.ticket_stock(ticket.id).await, 5);

    let again = orders.cancel_order(customer, &number).await.unwrap();
    assert_eq!(again.order.status, OrderStatus::Cancelled);
    assert_eq!(app.ticket_stock(ticket.id).await, 5);

    let err = app
        .state
        .services
        .payments
        .initiate_payment(customer, &number)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn orders_are_private_to_their_customer() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let ticket = app.seed_ticket(dec!(100000), 5).await;
    fill_cart(&app, customer, ticket.id, 1).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(customer, checkout_input())
        .await
        .unwrap();

    let stranger = Uuid::new_v4();
    let err = app
        .state
        .services
        .orders
        .get_order(stranger, &order.order.order_number)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let listed = app
        .state
        .services
        .orders
        .list_orders(stranger, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 0);
    assert!(listed.orders.is_empty());
}
