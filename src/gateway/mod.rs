//! Payment processor integration.
//!
//! Charges are created synchronously through a [`PaymentGateway`]; the final
//! outcome arrives later as a [`GatewayCallback`] posted to the callback
//! endpoint.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod http;

pub use self::http::HttpPaymentGateway;

/// Buyer details forwarded to the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One line of the charge; prices times quantities must add up to the gross amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRequest {
    /// Order reference echoed back in callbacks
    pub order_number: String,
    pub gross_amount: Decimal,
    pub currency: String,
    pub customer: ChargeCustomer,
    pub items: Vec<ChargeItem>,
    /// Where the processor sends the customer after paying
    pub finish_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChargeResponse {
    pub transaction_id: String,
    pub redirect_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected charge ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("charge request cannot be sent: {0}")]
    InvalidRequest(String),
}

/// Creates charges at an external payment processor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, GatewayError>;
}

/// Asynchronous status notification posted by the processor
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GatewayCallback {
    pub transaction_id: String,
    /// Order number sent when the charge was created
    pub order_id: String,
    /// Processor transaction status, e.g. `settlement` or `expire`
    pub status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_type: Option<String>,
}
