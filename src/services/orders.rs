use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
        payment::{self, Entity as PaymentEntity, Model as PaymentModel, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_status::{apply_transition, Transition},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Order together with its frozen items and payment record
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub payment: Option<PaymentModel>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Customer-facing order queries and cancellation
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists the customer's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        query: OrderListQuery,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator.fetch_page(page - 1).await?;

        info!(
            total = total,
            page = page,
            returned_count = orders.len(),
            "Orders listed"
        );

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Fetches one of the customer's orders by its order number
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let order = find_customer_order(&*self.db, customer_id, order_number).await?;
        load_order_details(&*self.db, order).await
    }

    /// Cancels a pending order on the customer's request.
    ///
    /// Goes through the same reducer as gateway callbacks, so a paid order
    /// cannot be cancelled and cancelling twice is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;

        let order = find_customer_order(&txn, customer_id, order_number).await?;
        let (order, transition) = apply_transition(&txn, order, OrderStatus::Cancelled).await?;

        if transition.is_applied() {
            if let Some(payment) = find_payment(&txn, order.id).await? {
                if payment.status == PaymentStatus::Pending {
                    let mut active: payment::ActiveModel = payment.into();
                    active.status = Set(PaymentStatus::Cancelled);
                    active.updated_at = Set(Utc::now());
                    active.update(&txn).await?;
                }
            }
        }

        txn.commit().await?;

        if let Transition::Applied { from, to } = transition {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id: order.id,
                    old_status: from,
                    new_status: to,
                })
                .await;
            info!("Order {} cancelled by customer", order.order_number);
        }

        load_order_details(&*self.db, order).await
    }
}

pub(crate) async fn find_customer_order<C>(
    conn: &C,
    customer_id: Uuid,
    order_number: &str,
) -> Result<OrderModel, ServiceError>
where
    C: ConnectionTrait,
{
    OrderEntity::find()
        .filter(order::Column::OrderNumber.eq(order_number))
        .filter(order::Column::CustomerId.eq(customer_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
}

pub(crate) async fn find_payment<C>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<PaymentModel>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .one(conn)
        .await?)
}

pub(crate) async fn load_order_items<C>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<OrderItemModel>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

pub(crate) async fn load_order_details<C>(
    conn: &C,
    order: OrderModel,
) -> Result<OrderDetails, ServiceError>
where
    C: ConnectionTrait,
{
    let items = load_order_items(conn, order.id).await?;
    let payment = find_payment(conn, order.id).await?;
    Ok(OrderDetails {
        order,
        items,
        payment,
    })
}
