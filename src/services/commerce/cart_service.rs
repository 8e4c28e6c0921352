use crate::{
    entities::{
        cart::{self, Entity as Cart, Model as CartModel},
        cart_item::{self, Entity as CartItem, Model as CartItemModel},
        ticket::Entity as Ticket,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::pricing,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Largest quantity a single cart line may hold
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// Shopping cart service, one cart per customer.
///
/// Every mutation runs in a transaction and finishes by recomputing the
/// cart's cached `subtotal` and `item_count` from its lines, so readers never
/// observe a cart whose totals disagree with its items.
///
/// # Examples
///
/// ```ignore
/// let cart_service = CartService::new(db, event_sender);
///
/// let cart = cart_service
///     .add_item(customer_id, AddToCartInput {
///         ticket_id,
///         quantity: 2,
///         visit_date: None,
///         special_requests: None,
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the customer's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let (cart, created) = find_or_create_cart(&*self.db, customer_id).await?;
        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.get_cart_with_items(cart).await
    }

    /// Adds a ticket to the cart.
    ///
    /// A line for the same ticket and visit date is merged: quantities add up
    /// and the unit price is refreshed to the ticket's current price.
    ///
    /// # Arguments
    ///
    /// * `customer_id` - Owner of the cart
    /// * `input` - Ticket, quantity and optional visit details
    ///
    /// # Returns
    ///
    /// * `Ok(CartWithItems)` - Updated cart with recalculated totals
    /// * `Err(ServiceError::ValidationError)` - Quantity below 1 or visit date in the past
    /// * `Err(ServiceError::NotFound)` - Ticket does not exist
    /// * `Err(ServiceError::InvalidOperation)` - Ticket is no longer on sale
    /// * `Err(ServiceError::InsufficientStock)` - Line quantity exceeds ticket stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        input.validate()?;
        ensure_visit_date_not_past(input.visit_date)?;

        let txn = self.db.begin().await?;

        let (cart, created) = find_or_create_cart(&txn, customer_id).await?;

        let ticket = Ticket::find_by_id(input.ticket_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Ticket {} not found", input.ticket_id))
            })?;

        if !ticket.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Ticket {} is not available",
                ticket.id
            )));
        }

        let same_line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::TicketId.eq(ticket.id));
        let same_line = match input.visit_date {
            Some(date) => same_line.filter(cart_item::Column::VisitDate.eq(date)),
            None => same_line.filter(cart_item::Column::VisitDate.is_null()),
        };
        let existing = same_line.one(&txn).await?;

        let current_quantity = existing.as_ref().map(|item| item.quantity).unwrap_or(0);
        let new_quantity = current_quantity
            .checked_add(input.quantity)
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "A cart line holds at most {} tickets",
                    MAX_LINE_QUANTITY
                ))
            })?;
        ensure_stock(&ticket.name, ticket.stock, new_quantity)?;

        let now = Utc::now();
        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.unit_price = Set(ticket.price);
                item.line_total = Set(pricing::line_total(ticket.price, new_quantity));
                if input.special_requests.is_some() {
                    item.special_requests = Set(input.special_requests.clone());
                }
                item.updated_at = Set(now);
                item.update(&txn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    ticket_id: Set(ticket.id),
                    quantity: Set(input.quantity),
                    unit_price: Set(ticket.price),
                    line_total: Set(pricing::line_total(ticket.price, input.quantity)),
                    visit_date: Set(input.visit_date),
                    special_requests: Set(input.special_requests.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                item.insert(&txn).await?;
            }
        }

        let cart = recalculate_cart_totals(&txn, cart).await?;
        txn.commit().await?;

        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                ticket_id: ticket.id,
            })
            .await;
        metrics::counter!("wisata_cart_mutations_total", 1, "operation" => "add_item");

        info!(
            "Added {} x ticket {} to cart {}",
            input.quantity, ticket.id, cart.id
        );
        self.get_cart_with_items(cart).await
    }

    /// Changes the quantity (and optionally visit details) of a cart line.
    ///
    /// A quantity below 1 is rejected; lines are only removed through
    /// [`CartService::remove_item`].
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        input: UpdateCartItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        input.validate()?;
        ensure_visit_date_not_past(input.visit_date)?;

        let txn = self.db.begin().await?;

        let (cart, item) = find_owned_item(&txn, customer_id, item_id).await?;

        let ticket = Ticket::find_by_id(item.ticket_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Ticket {} not found", item.ticket_id))
            })?;
        ensure_stock(&ticket.name, ticket.stock, input.quantity)?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(input.quantity);
        active.unit_price = Set(ticket.price);
        active.line_total = Set(pricing::line_total(ticket.price, input.quantity));
        if input.visit_date.is_some() {
            active.visit_date = Set(input.visit_date);
        }
        if input.special_requests.is_some() {
            active.special_requests = Set(input.special_requests.clone());
        }
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let cart = recalculate_cart_totals(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
            })
            .await;
        metrics::counter!("wisata_cart_mutations_total", 1, "operation" => "update_item");

        info!("Updated cart item {} in cart {}", item_id, cart.id);
        self.get_cart_with_items(cart).await
    }

    /// Removes a line from the customer's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let (cart, item) = find_owned_item(&txn, customer_id, item_id).await?;
        item.delete(&txn).await?;

        let cart = recalculate_cart_totals(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;
        metrics::counter!("wisata_cart_mutations_total", 1, "operation" => "remove_item");

        info!("Removed item {} from cart {}", item_id, cart.id);
        self.get_cart_with_items(cart).await
    }

    /// Removes every line; the cart itself is kept.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let (cart, _) = find_or_create_cart(&txn, customer_id).await?;
        let cart = empty_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;
        metrics::counter!("wisata_cart_mutations_total", 1, "operation" => "clear");

        info!("Cleared cart {}", cart.id);
        self.get_cart_with_items(cart).await
    }

    async fn get_cart_with_items(&self, cart: CartModel) -> Result<CartWithItems, ServiceError> {
        let items = load_items(&*self.db, cart.id).await?;
        Ok(CartWithItems { cart, items })
    }
}

/// Looks up the customer's cart, inserting an empty one if missing.
///
/// Returns the cart and whether it was just created.
pub(crate) async fn find_or_create_cart<C>(
    conn: &C,
    customer_id: Uuid,
) -> Result<(CartModel, bool), ServiceError>
where
    C: ConnectionTrait,
{
    if let Some(cart) = Cart::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .one(conn)
        .await?
    {
        return Ok((cart, false));
    }

    let now = Utc::now();
    let cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        subtotal: Set(Decimal::ZERO),
        item_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok((cart, true))
}

pub(crate) async fn load_items<C>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartItemModel>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Deletes all lines and zeroes the cached totals.
pub(crate) async fn empty_cart<C>(conn: &C, cart: CartModel) -> Result<CartModel, ServiceError>
where
    C: ConnectionTrait,
{
    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    let mut active: cart::ActiveModel = cart.into();
    active.subtotal = Set(Decimal::ZERO);
    active.item_count = Set(0);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

async fn recalculate_cart_totals<C>(conn: &C, cart: CartModel) -> Result<CartModel, ServiceError>
where
    C: ConnectionTrait,
{
    let items = load_items(conn, cart.id).await?;

    let subtotal = pricing::subtotal(items.iter().map(|i| (i.unit_price, i.quantity)));
    let item_count = items
        .iter()
        .try_fold(0i32, |acc, i| acc.checked_add(i.quantity))
        .ok_or_else(|| ServiceError::ValidationError("Cart holds too many tickets".into()))?;

    let mut active: cart::ActiveModel = cart.into();
    active.subtotal = Set(subtotal);
    active.item_count = Set(item_count);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

async fn find_owned_item<C>(
    conn: &C,
    customer_id: Uuid,
    item_id: Uuid,
) -> Result<(CartModel, CartItemModel), ServiceError>
where
    C: ConnectionTrait,
{
    let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));

    let cart = Cart::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;

    let item = CartItem::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;

    Ok((cart, item))
}

fn ensure_stock(ticket_name: &str, stock: i32, requested: i32) -> Result<(), ServiceError> {
    if requested > stock {
        return Err(ServiceError::InsufficientStock(format!(
            "{} has {} tickets left, requested {}",
            ticket_name, stock, requested
        )));
    }
    Ok(())
}

fn ensure_visit_date_not_past(visit_date: Option<NaiveDate>) -> Result<(), ServiceError> {
    match visit_date {
        Some(date) if date < Utc::now().date_naive() => Err(ServiceError::ValidationError(
            format!("Visit date {} is in the past", date),
        )),
        _ => Ok(()),
    }
}

/// Input for adding a ticket to the cart
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub ticket_id: Uuid,
    #[validate(range(min = 1, max = 10000, message = "quantity must be between 1 and 10000"))]
    pub quantity: i32,
    pub visit_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub special_requests: Option<String>,
}

/// Input for changing a cart line
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 1, max = 10000, message = "quantity must be between 1 and 10000"))]
    pub quantity: i32,
    pub visit_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub special_requests: Option<String>,
}

/// Cart together with its line items
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn quantity_below_one_is_invalid() {
        let input = UpdateCartItemInput {
            quantity: 0,
            visit_date: None,
            special_requests: None,
        };
        assert!(input.validate().is_err());

        let input = AddToCartInput {
            ticket_id: Uuid::new_v4(),
            quantity: -3,
            visit_date: None,
            special_requests: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn quantity_above_line_limit_is_invalid() {
        let input = AddToCartInput {
            ticket_id: Uuid::new_v4(),
            quantity: i32::MAX,
            visit_date: None,
            special_requests: None,
        };
        assert!(input.validate().is_err());

        let input = UpdateCartItemInput {
            quantity: MAX_LINE_QUANTITY,
            visit_date: None,
            special_requests: None,
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn past_visit_dates_are_rejected() {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        assert!(matches!(
            ensure_visit_date_not_past(Some(yesterday)),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(ensure_visit_date_not_past(Some(Utc::now().date_naive())).is_ok());
        assert!(ensure_visit_date_not_past(None).is_ok());
    }

    #[test]
    fn stock_check_allows_exact_fit() {
        assert!(ensure_stock("Prambanan", 3, 3).is_ok());
        assert!(matches!(
            ensure_stock("Prambanan", 3, 4),
            Err(ServiceError::InsufficientStock(_))
        ));
    }
}
