use crate::{
    config::AppConfig,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::Model as CartItemModel,
        order::{self, OrderStatus},
        order_item,
        payment::{self, PaymentStatus},
        ticket::{self, Entity as Ticket, Model as TicketModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            cart_service::{empty_cart, load_items},
            pricing::{self, OrderTotals},
        },
        orders::{load_order_details, OrderDetails},
        payments::{PaymentInitiation, PaymentService},
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Customer contact and payment details submitted at checkout
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CheckoutInput {
    #[validate(length(min = 1, max = 120), custom = "validate_not_blank")]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 6, max = 20), custom = "validate_not_blank")]
    pub customer_phone: String,
    #[validate(length(min = 1, max = 50), custom = "validate_not_blank")]
    pub payment_method: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// One frozen order line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLine {
    pub ticket_id: Uuid,
    pub ticket_name: String,
    pub destination: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub visit_date: Option<NaiveDate>,
    pub special_requests: Option<String>,
}

/// Immutable copy of the cart taken at checkout, with its totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub lines: Vec<SnapshotLine>,
    pub totals: OrderTotals,
}

/// Freezes cart lines into order lines and computes the order totals.
///
/// Lines are priced at the unit price held in the cart. Every ticket must
/// still be on sale with enough stock for the combined quantity of all lines
/// that reference it.
pub fn build_order_snapshot(
    lines: &[(CartItemModel, TicketModel)],
) -> Result<OrderSnapshot, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".to_string()));
    }

    let mut requested: HashMap<Uuid, i32> = HashMap::new();
    for (item, ticket) in lines {
        if !ticket.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is no longer available",
                ticket.name
            )));
        }
        if item.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Invalid quantity {} for {}",
                item.quantity, ticket.name
            )));
        }
        let total = requested.entry(ticket.id).or_insert(0);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            ServiceError::InsufficientStock(format!(
                "{} has {} tickets left",
                ticket.name, ticket.stock
            ))
        })?;
        if *total > ticket.stock {
            return Err(ServiceError::InsufficientStock(format!(
                "{} has {} tickets left, requested {}",
                ticket.name, ticket.stock, total
            )));
        }
    }

    let snapshot_lines: Vec<SnapshotLine> = lines
        .iter()
        .map(|(item, ticket)| SnapshotLine {
            ticket_id: ticket.id,
            ticket_name: ticket.name.clone(),
            destination: ticket.destination.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: pricing::line_total(item.unit_price, item.quantity),
            visit_date: item.visit_date,
            special_requests: item.special_requests.clone(),
        })
        .collect();

    let subtotal = snapshot_lines.iter().map(|l| l.subtotal).sum();

    Ok(OrderSnapshot {
        lines: snapshot_lines,
        totals: OrderTotals::from_subtotal(subtotal),
    })
}

/// `TIX-YYYYMMDD-XXXXXXXX`, the suffix being 8 uppercase hex digits.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("TIX-{}-{}", now.format("%Y%m%d"), &suffix[..8])
}

/// Order and payment initiation returned by checkout
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResult {
    #[serde(flatten)]
    pub order: OrderDetails,
    pub payment_initiation: PaymentInitiation,
}

/// Turns a customer's cart into an order
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Places the order, then asks the gateway for a charge.
    ///
    /// The order exists even when the charge fails; the returned initiation
    /// then carries the failure redirect.
    #[instrument(skip(self, payments, input))]
    pub async fn checkout(
        &self,
        customer_id: Uuid,
        input: CheckoutInput,
        payments: &PaymentService,
    ) -> Result<CheckoutResult, ServiceError> {
        let order = self.place_order(customer_id, input).await?;
        let payment_initiation = payments.initiate_for_order(&order.order).await?;

        // reload so the payment row reflects the charge outcome
        let order = load_order_details(&*self.db, order.order).await?;
        Ok(CheckoutResult {
            order,
            payment_initiation,
        })
    }

    /// Builds the order from the cart in a single transaction.
    ///
    /// Inserts the order, its frozen items and a pending payment, takes the
    /// ordered quantities out of ticket stock, and empties the cart. Nothing
    /// is written when any step fails.
    ///
    /// # Errors
    ///
    /// * `ServiceError::ValidationError` - Cart is empty or contact details are invalid
    /// * `ServiceError::InvalidOperation` - A ticket was taken off sale
    /// * `ServiceError::InsufficientStock` - Not enough tickets left
    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Cart is empty".to_string()))?;

        let items = load_items(&txn, cart.id).await?;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let ticket = Ticket::find_by_id(item.ticket_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Ticket {} not found", item.ticket_id))
                })?;
            lines.push((item, ticket));
        }

        let snapshot = build_order_snapshot(&lines)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number(now);

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            customer_name: Set(input.customer_name.trim().to_string()),
            customer_email: Set(input.customer_email.trim().to_string()),
            customer_phone: Set(input.customer_phone.trim().to_string()),
            subtotal: Set(snapshot.totals.subtotal),
            platform_fee: Set(snapshot.totals.platform_fee),
            total_amount: Set(snapshot.totals.total_amount),
            currency: Set(self.config.currency.clone()),
            status: Set(OrderStatus::Pending),
            notes: Set(input.notes.clone()),
            paid_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &snapshot.lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                ticket_id: Set(line.ticket_id),
                ticket_name: Set(line.ticket_name.clone()),
                destination: Set(line.destination.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                subtotal: Set(line.subtotal),
                visit_date: Set(line.visit_date),
                special_requests: Set(line.special_requests.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;

            let updated = Ticket::update_many()
                .col_expr(
                    ticket::Column::Stock,
                    Expr::col(ticket::Column::Stock).sub(line.quantity),
                )
                .col_expr(ticket::Column::UpdatedAt, Expr::value(now))
                .filter(ticket::Column::Id.eq(line.ticket_id))
                .filter(ticket::Column::Stock.gte(line.quantity))
                .exec(&txn)
                .await?;
            if updated.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} sold out during checkout",
                    line.ticket_name
                )));
            }
        }

        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            method: Set(input.payment_method.trim().to_string()),
            amount: Set(snapshot.totals.total_amount),
            currency: Set(self.config.currency.clone()),
            status: Set(PaymentStatus::Pending),
            transaction_id: Set(None),
            redirect_url: Set(None),
            gateway_status: Set(None),
            failure_reason: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        empty_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                order_number: order_number.clone(),
                total_amount: snapshot.totals.total_amount,
            })
            .await;
        metrics::counter!("wisata_orders_created_total", 1);

        info!(
            "Placed order {} for customer {} (total {})",
            order_number, customer_id, snapshot.totals.total_amount
        );
        load_order_details(&*self.db, order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticket(price: Decimal, stock: i32) -> TicketModel {
        let now = Utc::now();
        TicketModel {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Pura Tanah Lot".into(),
            destination: "Tabanan".into(),
            province: Some("Bali".into()),
            description: None,
            price,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(ticket: &TicketModel, quantity: i32) -> CartItemModel {
        let now = Utc::now();
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            ticket_id: ticket.id,
            quantity,
            unit_price: ticket.price,
            line_total: ticket.price * Decimal::from(quantity),
            visit_date: None,
            special_requests: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_cart_is_a_validation_error() {
        assert!(matches!(
            build_order_snapshot(&[]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn snapshot_totals_follow_worked_example() {
        let t = ticket(dec!(100000), 10);
        let snapshot = build_order_snapshot(&[(line(&t, 2), t.clone())]).unwrap();

        assert_eq!(snapshot.totals.subtotal, dec!(200000));
        assert_eq!(snapshot.totals.platform_fee, dec!(10000));
        assert_eq!(snapshot.totals.total_amount, dec!(210000));
        assert_eq!(snapshot.lines[0].ticket_name, "Pura Tanah Lot");
    }

    #[test]
    fn stock_is_checked_across_lines_of_the_same_ticket() {
        let t = ticket(dec!(25000), 3);
        let lines = vec![(line(&t, 2), t.clone()), (line(&t, 2), t.clone())];
        assert!(matches!(
            build_order_snapshot(&lines),
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[test]
    fn non_positive_or_overflowing_quantities_block_checkout() {
        let t = ticket(dec!(25000), 10);
        assert!(matches!(
            build_order_snapshot(&[(line(&t, -5), t.clone())]),
            Err(ServiceError::ValidationError(_))
        ));

        let lines = vec![(line(&t, 5), t.clone()), (line(&t, i32::MAX), t.clone())];
        assert!(matches!(
            build_order_snapshot(&lines),
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[test]
    fn inactive_tickets_block_checkout() {
        let mut t = ticket(dec!(25000), 3);
        t.is_active = false;
        assert!(matches!(
            build_order_snapshot(&[(line(&t, 1), t.clone())]),
            Err(ServiceError::InvalidOperation(_))
        ));
    }

    #[test]
    fn order_number_has_date_and_hex_suffix() {
        let now = Utc::now();
        let number = generate_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TIX");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn blank_contact_fields_are_rejected() {
        let input = CheckoutInput {
            customer_name: "   ".into(),
            customer_email: "sari@example.com".into(),
            customer_phone: "081234567890".into(),
            payment_method: "bank_transfer".into(),
            notes: None,
        };
        assert!(input.validate().is_err());

        let input = CheckoutInput {
            customer_name: "Sari".into(),
            customer_email: "not-an-email".into(),
            customer_phone: "081234567890".into(),
            payment_method: "bank_transfer".into(),
            notes: None,
        };
        assert!(input.validate().is_err());
    }
}
