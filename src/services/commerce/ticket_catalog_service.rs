use crate::{
    entities::ticket::{self, Entity as Ticket, Model as TicketModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::pricing,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

/// Destination ticket catalog: sellers list tickets, customers browse them.
#[derive(Clone)]
pub struct TicketCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl TicketCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists a new ticket owned by `seller_id`.
    #[instrument(skip(self, input), fields(seller_id = %seller_id))]
    pub async fn create_ticket(
        &self,
        seller_id: Uuid,
        input: CreateTicketInput,
    ) -> Result<TicketModel, ServiceError> {
        input.validate()?;

        let ticket_id = Uuid::new_v4();
        let now = Utc::now();

        let ticket = ticket::ActiveModel {
            id: Set(ticket_id),
            seller_id: Set(seller_id),
            name: Set(input.name.trim().to_string()),
            destination: Set(input.destination.trim().to_string()),
            province: Set(input.province),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let ticket = ticket.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::TicketCreated(ticket_id))
            .await;

        info!("Created ticket: {}", ticket_id);
        Ok(ticket)
    }

    /// Updates price, stock, description or availability.
    ///
    /// Only the seller who listed the ticket may change it.
    #[instrument(skip(self, input), fields(seller_id = %seller_id, ticket_id = %ticket_id))]
    pub async fn update_ticket(
        &self,
        seller_id: Uuid,
        ticket_id: Uuid,
        input: UpdateTicketInput,
    ) -> Result<TicketModel, ServiceError> {
        input.validate()?;

        let ticket = self.get_ticket(ticket_id).await?;
        if ticket.seller_id != seller_id {
            return Err(ServiceError::Forbidden(format!(
                "Ticket {} belongs to another seller",
                ticket_id
            )));
        }

        let mut active: ticket::ActiveModel = ticket.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let ticket = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::TicketUpdated(ticket_id))
            .await;

        info!("Updated ticket {}", ticket_id);
        Ok(ticket)
    }

    /// Get ticket by ID
    #[instrument(skip(self))]
    pub async fn get_ticket(&self, ticket_id: Uuid) -> Result<TicketModel, ServiceError> {
        Ticket::find_by_id(ticket_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Ticket {} not found", ticket_id)))
    }

    /// Pages through active tickets, newest first.
    #[instrument(skip(self))]
    pub async fn list_tickets(&self, query: TicketSearchQuery) -> Result<TicketPage, ServiceError> {
        let mut db_query = Ticket::find().filter(ticket::Column::IsActive.eq(true));

        if let Some(destination) = query
            .destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            db_query = db_query.filter(ticket::Column::Destination.contains(destination));
        }

        let total = db_query.clone().count(&*self.db).await?;

        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let page = query.page.unwrap_or(1).max(1);

        let items = db_query
            .order_by_desc(ticket::Column::CreatedAt)
            .limit(limit)
            .offset((page - 1) * limit)
            .all(&*self.db)
            .await?;

        Ok(TicketPage {
            items,
            total,
            page,
            limit,
        })
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        let mut err = ValidationError::new("price");
        err.message = Some("price must be greater than zero".into());
        return Err(err);
    }
    if !pricing::is_whole_amount(*price) {
        let mut err = ValidationError::new("price");
        err.message = Some("price must be a whole rupiah amount".into());
        return Err(err);
    }
    Ok(())
}

/// Input for listing a ticket
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateTicketInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub destination: String,
    pub province: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub is_active: Option<bool>,
}

/// Input for updating a ticket
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateTicketInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

/// Ticket listing query
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TicketSearchQuery {
    /// Substring match on destination
    pub destination: Option<String>,
    /// 1-based page number
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// One page of tickets
#[derive(Debug, Serialize, ToSchema)]
pub struct TicketPage {
    pub items: Vec<TicketModel>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_input() -> CreateTicketInput {
        CreateTicketInput {
            name: "Candi Borobudur".into(),
            destination: "Magelang".into(),
            province: Some("Jawa Tengah".into()),
            description: None,
            price: dec!(50000),
            stock: 10,
            is_active: None,
        }
    }

    #[test]
    fn create_input_accepts_valid_ticket() {
        assert!(create_input().validate().is_ok());
    }

    #[test]
    fn create_input_rejects_non_positive_price() {
        let mut input = create_input();
        input.price = Decimal::ZERO;
        assert!(input.validate().is_err());
    }

    #[test]
    fn fractional_prices_are_rejected() {
        let mut input = create_input();
        input.price = dec!(100000.5);
        assert!(input.validate().is_err());

        input.price = dec!(100000.00);
        assert!(input.validate().is_ok());

        let update = UpdateTicketInput {
            price: Some(dec!(49999.99)),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn create_input_rejects_negative_stock() {
        let mut input = create_input();
        input.stock = -1;
        assert!(input.validate().is_err());
    }

    #[test]
    fn update_input_allows_partial_changes() {
        let input = UpdateTicketInput {
            stock: Some(0),
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        let bad = UpdateTicketInput {
            price: Some(dec!(-1)),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
