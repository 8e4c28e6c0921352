use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the marketplace services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    TicketCreated(Uuid),
    TicketUpdated(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, ticket_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),

    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Payment events
    PaymentInitiated {
        order_id: Uuid,
        transaction_id: String,
    },
    PaymentInitiationFailed {
        order_id: Uuid,
        reason: String,
    },
    CallbackRejected {
        order_number: String,
        reason: String,
        received_at: DateTime<Utc>,
    },
}

impl Event {
    /// Short stable name used in logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Event::TicketCreated(_) => "ticket_created",
            Event::TicketUpdated(_) => "ticket_updated",
            Event::CartCreated(_) => "cart_created",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemUpdated { .. } => "cart_item_updated",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CartCleared(_) => "cart_cleared",
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentInitiated { .. } => "payment_initiated",
            Event::PaymentInitiationFailed { .. } => "payment_initiation_failed",
            Event::CallbackRejected { .. } => "callback_rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("wisata_events_processed_total", 1, "event" => event.name());

        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                total_amount,
            } => {
                info!(%order_id, %order_number, %total_amount, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, from = %old_status, to = %new_status, "order status changed");
            }
            Event::PaymentInitiationFailed { order_id, reason } => {
                warn!(%order_id, %reason, "payment initiation failed");
            }
            Event::CallbackRejected {
                order_number,
                reason,
                ..
            } => {
                warn!(%order_number, %reason, "payment callback rejected");
            }
            other => debug!(event = other.name(), payload = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        sender.send(Event::CartCleared(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::CartCleared(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::CartCreated(Uuid::new_v4())).await.is_err());
        sender.send_or_log(Event::CartCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn process_events_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::TicketCreated(Uuid::new_v4()))
            .await
            .unwrap();
        drop(sender);

        process_events(rx).await;
    }
}
