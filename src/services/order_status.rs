//! Order status state machine and gateway status mapping.
//!
//! Allowed moves: `pending -> paid`, `pending -> cancelled`,
//! `paid -> refunded`. Asking for the status an order already has is a no-op.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set,
};
use std::str::FromStr;
use strum::EnumString;
use tracing::{info, warn};

use crate::{
    entities::{
        order::{self, Model as OrderModel, OrderStatus},
        order_item::{self, Entity as OrderItem},
        payment::PaymentStatus,
        ticket::{self, Entity as Ticket},
    },
    errors::ServiceError,
};

/// Result of asking the reducer to move an order to a new status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: OrderStatus, to: OrderStatus },
    Unchanged,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Paid)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Paid, OrderStatus::Refunded)
    )
}

/// Decides whether `current -> target` is applied, ignored or refused.
pub fn reduce(current: OrderStatus, target: OrderStatus) -> Result<Transition, ServiceError> {
    if current == target {
        return Ok(Transition::Unchanged);
    }
    if is_valid_transition(current, target) {
        Ok(Transition::Applied {
            from: current,
            to: target,
        })
    } else {
        Err(ServiceError::InvalidTransition {
            from: current,
            to: target,
        })
    }
}

/// Transaction statuses reported by the payment processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GatewayStatus {
    Capture,
    Settlement,
    Success,
    Paid,
    Pending,
    Deny,
    Failure,
    Failed,
    Cancel,
    Cancelled,
    Expire,
    Expired,
    Refund,
    Refunded,
}

/// Internal statuses a gateway status maps to.
///
/// `payment` is `None` when the payment row keeps its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order: OrderStatus,
    pub payment: Option<PaymentStatus>,
}

impl StatusUpdate {
    fn new(order: OrderStatus, payment: PaymentStatus) -> Self {
        Self {
            order,
            payment: Some(payment),
        }
    }
}

/// Maps a raw processor status (plus optional fraud verdict) to internal statuses.
///
/// Unknown statuses are refused with [`ServiceError::InvalidStatus`].
pub fn map_gateway_status(
    status: &str,
    fraud_status: Option<&str>,
) -> Result<StatusUpdate, ServiceError> {
    let parsed = GatewayStatus::from_str(status.trim())
        .map_err(|_| ServiceError::InvalidStatus(format!("unknown gateway status '{}'", status)))?;

    let fraud = fraud_status.map(|f| f.trim().to_ascii_lowercase());

    let update = match parsed {
        GatewayStatus::Capture => match fraud.as_deref() {
            Some("challenge") => StatusUpdate::new(OrderStatus::Pending, PaymentStatus::Pending),
            Some("deny") => StatusUpdate::new(OrderStatus::Cancelled, PaymentStatus::Failed),
            _ => StatusUpdate::new(OrderStatus::Paid, PaymentStatus::Success),
        },
        GatewayStatus::Settlement | GatewayStatus::Success | GatewayStatus::Paid => {
            StatusUpdate::new(OrderStatus::Paid, PaymentStatus::Success)
        }
        GatewayStatus::Pending => StatusUpdate::new(OrderStatus::Pending, PaymentStatus::Pending),
        GatewayStatus::Deny | GatewayStatus::Failure | GatewayStatus::Failed => {
            StatusUpdate::new(OrderStatus::Cancelled, PaymentStatus::Failed)
        }
        GatewayStatus::Cancel
        | GatewayStatus::Cancelled
        | GatewayStatus::Expire
        | GatewayStatus::Expired => {
            StatusUpdate::new(OrderStatus::Cancelled, PaymentStatus::Cancelled)
        }
        GatewayStatus::Refund | GatewayStatus::Refunded => StatusUpdate {
            order: OrderStatus::Refunded,
            payment: None,
        },
    };

    Ok(update)
}

/// Runs the reducer against a stored order and persists the outcome.
///
/// Moving to `paid` stamps `paid_at`; moving to `cancelled` stamps
/// `cancelled_at` and returns the ordered quantities to ticket stock.
pub(crate) async fn apply_transition<C>(
    conn: &C,
    order: OrderModel,
    target: OrderStatus,
) -> Result<(OrderModel, Transition), ServiceError>
where
    C: ConnectionTrait,
{
    let transition = match reduce(order.status, target) {
        Ok(t) => t,
        Err(e) => {
            warn!(
                order_number = %order.order_number,
                from = %order.status,
                to = %target,
                "refusing order status transition"
            );
            return Err(e);
        }
    };

    if transition == Transition::Unchanged {
        return Ok((order, transition));
    }

    let order_id = order.id;
    let order_number = order.order_number.clone();
    let now = Utc::now();

    let mut active: order::ActiveModel = order.into();
    active.status = Set(target);
    active.updated_at = Set(now);
    match target {
        OrderStatus::Paid => active.paid_at = Set(Some(now)),
        OrderStatus::Cancelled => active.cancelled_at = Set(Some(now)),
        _ => {}
    }
    let updated = active.update(conn).await?;

    if target == OrderStatus::Cancelled {
        restock_order_items(conn, order_id).await?;
    }

    metrics::counter!("wisata_order_transitions_total", 1, "to" => target.as_str());
    info!(%order_number, to = %target, "order status updated");

    Ok((updated, transition))
}

async fn restock_order_items<C>(conn: &C, order_id: uuid::Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for item in items {
        Ticket::update_many()
            .col_expr(
                ticket::Column::Stock,
                Expr::col(ticket::Column::Stock).add(item.quantity),
            )
            .col_expr(ticket::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(ticket::Column::Id.eq(item.ticket_id))
            .exec(conn)
            .await?;
    }

    Ok(())
}
