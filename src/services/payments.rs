use crate::{
    config::AppConfig,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{ChargeCustomer, ChargeItem, ChargeRequest, GatewayCallback, PaymentGateway},
    services::{
        order_status::{apply_transition, map_gateway_status, Transition},
        orders::{find_customer_order, find_payment, load_order_items},
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Outcome of asking the gateway for a charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaymentInitiation {
    pub order_number: String,
    pub success: bool,
    pub transaction_id: Option<String>,
    /// Hosted payment page on success, failure page otherwise
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of applying a gateway callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CallbackOutcome {
    pub order_number: String,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Whether the callback changed the order status
    pub applied: bool,
}

/// Charge creation and callback handling
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            config,
        }
    }

    /// Customer-initiated payment attempt for one of their pending orders.
    #[instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<PaymentInitiation, ServiceError> {
        let order = find_customer_order(&*self.db, customer_id, order_number).await?;
        self.initiate_for_order(&order).await
    }

    /// Requests a charge for `order` from the gateway.
    ///
    /// A gateway failure is not an error here: the order stays pending, the
    /// reason is stored on the payment row, and the returned initiation points
    /// at the failure page so the customer can retry.
    ///
    /// # Errors
    ///
    /// * `ServiceError::InvalidOperation` - Order is not pending
    /// * `ServiceError::NotFound` - Order has no payment record
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn initiate_for_order(
        &self,
        order: &OrderModel,
    ) -> Result<PaymentInitiation, ServiceError> {
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {}; only pending orders can be paid",
                order.order_number, order.status
            )));
        }

        let payment = find_payment(&*self.db, order.id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Payment for order {} not found", order.order_number))
        })?;

        let request = self.build_charge_request(order).await?;
        let result = self.gateway.create_charge(request).await;

        let mut active: payment::ActiveModel = payment.into();
        active.updated_at = Set(Utc::now());

        match result {
            Ok(charge) => {
                active.transaction_id = Set(Some(charge.transaction_id.clone()));
                active.redirect_url = Set(Some(charge.redirect_url.clone()));
                active.failure_reason = Set(None);
                active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentInitiated {
                        order_id: order.id,
                        transaction_id: charge.transaction_id.clone(),
                    })
                    .await;
                metrics::counter!("wisata_payment_initiations_total", 1, "outcome" => "success");

                info!("Payment initiated for order {}", order.order_number);
                Ok(PaymentInitiation {
                    order_number: order.order_number.clone(),
                    success: true,
                    transaction_id: Some(charge.transaction_id),
                    redirect_url: charge.redirect_url,
                    message: None,
                })
            }
            Err(err) => {
                let reason = err.to_string();
                active.failure_reason = Set(Some(reason.clone()));
                active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentInitiationFailed {
                        order_id: order.id,
                        reason: reason.clone(),
                    })
                    .await;
                metrics::counter!("wisata_payment_initiations_total", 1, "outcome" => "failure");

                warn!(order_number = %order.order_number, error = %reason, "payment initiation failed");
                Ok(PaymentInitiation {
                    order_number: order.order_number.clone(),
                    success: false,
                    transaction_id: None,
                    redirect_url: with_order_number(
                        &self.config.payment_gateway.failure_url,
                        &order.order_number,
                    ),
                    message: Some(reason),
                })
            }
        }
    }

    /// Applies an asynchronous status notification from the gateway.
    ///
    /// Rejections (unknown status, unknown order, amount mismatch, illegal
    /// transition) leave the order untouched and are published as
    /// `CallbackRejected` events.
    #[instrument(skip(self, callback), fields(order_number = %callback.order_id, status = %callback.status))]
    pub async fn handle_callback(
        &self,
        callback: GatewayCallback,
    ) -> Result<CallbackOutcome, ServiceError> {
        match self.apply_callback(&callback).await {
            Ok((outcome, transition, order_id)) => {
                if let Transition::Applied { from, to } = transition {
                    self.event_sender
                        .send_or_log(Event::OrderStatusChanged {
                            order_id,
                            old_status: from,
                            new_status: to,
                        })
                        .await;
                }
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "payment callback rejected");
                self.event_sender
                    .send_or_log(Event::CallbackRejected {
                        order_number: callback.order_id.clone(),
                        reason: err.to_string(),
                        received_at: Utc::now(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn apply_callback(
        &self,
        callback: &GatewayCallback,
    ) -> Result<(CallbackOutcome, Transition, Uuid), ServiceError> {
        let update = map_gateway_status(&callback.status, callback.fraud_status.as_deref())?;

        let txn = self.db.begin().await?;

        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(callback.order_id.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", callback.order_id)))?;

        if let Some(amount) = callback.gross_amount {
            if amount != order.total_amount {
                return Err(ServiceError::BadRequest(format!(
                    "gross amount {} does not match order total {}",
                    amount, order.total_amount
                )));
            }
        }

        let order_id = order.id;
        let (order, transition) = apply_transition(&txn, order, update.order).await?;

        let payment = find_payment(&txn, order_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Payment for order {} not found", order.order_number))
        })?;

        let now = Utc::now();
        let mut active: payment::ActiveModel = payment.clone().into();
        active.transaction_id = Set(Some(callback.transaction_id.clone()));
        active.gateway_status = Set(Some(callback.status.trim().to_string()));
        if let Some(status) = update.payment {
            active.status = Set(status);
            if status == PaymentStatus::Success && payment.paid_at.is_none() {
                active.paid_at = Set(Some(now));
            }
        }
        active.updated_at = Set(now);
        let payment = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            order_number = %order.order_number,
            order_status = %order.status,
            payment_status = %payment.status,
            applied = transition.is_applied(),
            "payment callback processed"
        );

        Ok((
            CallbackOutcome {
                order_number: order.order_number,
                order_status: order.status,
                payment_status: payment.status,
                applied: transition.is_applied(),
            },
            transition,
            order_id,
        ))
    }

    async fn build_charge_request(&self, order: &OrderModel) -> Result<ChargeRequest, ServiceError> {
        let items = load_order_items(&*self.db, order.id).await?;

        let mut charge_items: Vec<ChargeItem> = items
            .into_iter()
            .map(|item| ChargeItem {
                id: item.ticket_id.to_string(),
                name: item.ticket_name,
                price: item.unit_price,
                quantity: item.quantity,
            })
            .collect();
        if !order.platform_fee.is_zero() {
            charge_items.push(ChargeItem {
                id: "platform-fee".to_string(),
                name: "Platform fee".to_string(),
                price: order.platform_fee,
                quantity: 1,
            });
        }

        Ok(ChargeRequest {
            order_number: order.order_number.clone(),
            gross_amount: order.total_amount,
            currency: order.currency.clone(),
            customer: ChargeCustomer {
                name: order.customer_name.clone(),
                email: order.customer_email.clone(),
                phone: order.customer_phone.clone(),
            },
            items: charge_items,
            finish_url: with_order_number(
                &self.config.payment_gateway.finish_url,
                &order.order_number,
            ),
        })
    }
}

/// Appends `order_number` as a query parameter.
fn with_order_number(url: &str, order_number: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}order_number={}", url, separator, order_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        entities::ticket,
        gateway::{ChargeResponse, GatewayError, MockPaymentGateway},
        services::commerce::{
            cart_service::{AddToCartInput, CartService},
            checkout_service::{CheckoutInput, CheckoutService},
        },
    };
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    struct Fixture {
        db: Arc<DatabaseConnection>,
        payments: PaymentService,
        order: OrderModel,
        ticket_id: Uuid,
        customer_id: Uuid,
        _events: mpsc::Receiver<Event>,
    }

    async fn fixture(gateway: MockPaymentGateway) -> Fixture {
        let db_cfg = db::DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let conn = db::establish_connection_with_config(&db_cfg).await.unwrap();
        db::run_migrations(&conn).await.unwrap();
        let db = Arc::new(conn);

        let (tx, rx) = mpsc::channel(64);
        let events = Arc::new(EventSender::new(tx));
        let config = Arc::new(AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            0,
            "test".into(),
        ));

        let now = Utc::now();
        let ticket_id = Uuid::new_v4();
        ticket::ActiveModel {
            id: Set(ticket_id),
            seller_id: Set(Uuid::new_v4()),
            name: Set("Candi Prambanan".into()),
            destination: Set("Sleman".into()),
            province: Set(None),
            description: Set(None),
            price: Set(dec!(100000)),
            stock: Set(5),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*db)
        .await
        .unwrap();

        let customer_id = Uuid::new_v4();
        CartService::new(db.clone(), events.clone())
            .add_item(
                customer_id,
                AddToCartInput {
                    ticket_id,
                    quantity: 2,
                    visit_date: None,
                    special_requests: None,
                },
            )
            .await
            .unwrap();

        let payments = PaymentService::new(
            db.clone(),
            events.clone(),
            Arc::new(gateway),
            config.clone(),
        );
        let checkout = CheckoutService::new(db.clone(), events, config);
        let details = checkout
            .place_order(
                customer_id,
                CheckoutInput {
                    customer_name: "Sari".into(),
                    customer_email: "sari@example.com".into(),
                    customer_phone: "081234567890".into(),
                    payment_method: "bank_transfer".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();

        Fixture {
            db,
            payments,
            order: details.order,
            ticket_id,
            customer_id,
            _events: rx,
        }
    }

    fn callback(order: &OrderModel, status: &str) -> GatewayCallback {
        GatewayCallback {
            transaction_id: "tx-123".into(),
            order_id: order.order_number.clone(),
            status: status.into(),
            fraud_status: None,
            gross_amount: None,
            payment_type: Some("bank_transfer".into()),
        }
    }

    #[tokio::test]
    async fn successful_charge_stores_transaction_on_payment() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_charge()
            .withf(|req| {
                let items_total: Decimal = req
                    .items
                    .iter()
                    .map(|item| item.price * Decimal::from(item.quantity))
                    .sum();
                req.gross_amount == dec!(210000)
                    && req.items.len() == 2
                    && items_total == req.gross_amount
            })
            .times(1)
            .returning(|_| {
                Ok(ChargeResponse {
                    transaction_id: "snap-token-1".into(),
                    redirect_url: "https://pay.test/snap-token-1".into(),
                })
            });
        let fx = fixture(gateway).await;

        let result = fx
            .payments
            .initiate_payment(fx.customer_id, &fx.order.order_number)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.redirect_url, "https://pay.test/snap-token-1");

        let payment = find_payment(&*fx.db, fx.order.id).await.unwrap().unwrap();
        assert_eq!(payment.transaction_id.as_deref(), Some("snap-token-1"));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_order_pending_and_points_to_failure_page() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_charge()
            .times(1)
            .returning(|_| Err(GatewayError::Transport("connection reset".into())));
        let fx = fixture(gateway).await;

        let result = fx.payments.initiate_for_order(&fx.order).await.unwrap();

        assert!(!result.success);
        assert!(result.redirect_url.starts_with("http://localhost:3000/payment/failed?"));
        assert!(result.redirect_url.ends_with(&fx.order.order_number));

        let order = OrderEntity::find_by_id(fx.order.id)
            .one(&*fx.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        let payment = find_payment(&*fx.db, fx.order.id).await.unwrap().unwrap();
        assert!(payment.failure_reason.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn settlement_callback_marks_order_paid_once() {
        let fx = fixture(MockPaymentGateway::new()).await;

        let first = fx
            .payments
            .handle_callback(callback(&fx.order, "settlement"))
            .await
            .unwrap();
        assert_eq!(first.order_status, OrderStatus::Paid);
        assert_eq!(first.payment_status, PaymentStatus::Success);
        assert!(first.applied);

        let again = fx
            .payments
            .handle_callback(callback(&fx.order, "settlement"))
            .await
            .unwrap();
        assert!(!again.applied);
        assert_eq!(again.order_status, OrderStatus::Paid);

        let order = OrderEntity::find_by_id(fx.order.id)
            .one(&*fx.db)
            .await
            .unwrap()
            .unwrap();
        assert!(order.paid_at.is_some());
    }

    #[tokio::test]
    async fn pending_callback_after_paid_is_rejected() {
        let fx = fixture(MockPaymentGateway::new()).await;
        fx.payments
            .handle_callback(callback(&fx.order, "settlement"))
            .await
            .unwrap();

        let err = fx
            .payments
            .handle_callback(callback(&fx.order, "pending"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::InvalidTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Pending
            }
        );
    }

    #[tokio::test]
    async fn unknown_status_and_amount_mismatch_leave_order_untouched() {
        let fx = fixture(MockPaymentGateway::new()).await;

        let err = fx
            .payments
            .handle_callback(callback(&fx.order, "teleported"))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidStatus(_));

        let mut cb = callback(&fx.order, "settlement");
        cb.gross_amount = Some(dec!(1));
        let err = fx.payments.handle_callback(cb).await.unwrap_err();
        assert_matches!(err, ServiceError::BadRequest(_));

        let order = OrderEntity::find_by_id(fx.order.id)
            .one(&*fx.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn expire_callback_cancels_and_restocks() {
        let fx = fixture(MockPaymentGateway::new()).await;

        let outcome = fx
            .payments
            .handle_callback(callback(&fx.order, "expire"))
            .await
            .unwrap();
        assert_eq!(outcome.order_status, OrderStatus::Cancelled);
        assert_eq!(outcome.payment_status, PaymentStatus::Cancelled);

        let ticket = ticket::Entity::find_by_id(fx.ticket_id)
            .one(&*fx.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ticket.stock, 5);
    }

    #[tokio::test]
    async fn paid_orders_cannot_start_a_new_payment() {
        let fx = fixture(MockPaymentGateway::new()).await;
        fx.payments
            .handle_callback(callback(&fx.order, "settlement"))
            .await
            .unwrap();

        let err = fx
            .payments
            .initiate_payment(fx.customer_id, &fx.order.order_number)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[test]
    fn order_number_is_appended_as_query_param() {
        assert_eq!(
            with_order_number("http://x/failed", "TIX-1"),
            "http://x/failed?order_number=TIX-1"
        );
        assert_eq!(
            with_order_number("http://x/failed?lang=id", "TIX-1"),
            "http://x/failed?lang=id&order_number=TIX-1"
        );
    }
}
