use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{ChargeRequest, ChargeResponse, GatewayError, PaymentGateway};
use crate::{config::PaymentGatewayConfig, services::commerce::pricing};

const CHARGE_PATH: &str = "/snap/v1/transactions";

/// Snap-style hosted payment page client.
///
/// One POST per charge, no retries: a failed call is reported to the caller
/// as-is.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
        })
    }

    fn charge_url(&self) -> String {
        format!("{}{}", self.base_url, CHARGE_PATH)
    }
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
    item_details: Vec<ItemDetails<'a>>,
    callbacks: Callbacks<'a>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
    id: &'a str,
    price: i64,
    quantity: i32,
    name: &'a str,
}

#[derive(Serialize)]
struct Callbacks<'a> {
    finish: &'a str,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

#[derive(Deserialize)]
struct SnapErrorBody {
    #[serde(default)]
    error_messages: Vec<String>,
}

fn whole_amount(amount: Decimal) -> Result<i64, GatewayError> {
    if !pricing::is_whole_amount(amount) {
        return Err(GatewayError::InvalidRequest(format!(
            "amount {} is not a whole rupiah value",
            amount
        )));
    }
    pricing::round_amount(amount)
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidRequest(format!("amount {} out of range", amount)))
}

impl<'a> SnapRequest<'a> {
    fn from_charge(request: &'a ChargeRequest) -> Result<Self, GatewayError> {
        let item_details = request
            .items
            .iter()
            .map(|item| {
                Ok(ItemDetails {
                    id: &item.id,
                    price: whole_amount(item.price)?,
                    quantity: item.quantity,
                    name: &item.name,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let gross_amount = whole_amount(request.gross_amount)?;
        let items_total = item_details.iter().try_fold(0i64, |acc, item| {
            item.price
                .checked_mul(i64::from(item.quantity))
                .and_then(|line| acc.checked_add(line))
        });
        if items_total != Some(gross_amount) {
            return Err(GatewayError::InvalidRequest(format!(
                "item details do not add up to gross amount {}",
                gross_amount
            )));
        }

        Ok(Self {
            transaction_details: TransactionDetails {
                order_id: &request.order_number,
                gross_amount,
            },
            customer_details: CustomerDetails {
                first_name: &request.customer.name,
                email: &request.customer.email,
                phone: &request.customer.phone,
            },
            item_details,
            callbacks: Callbacks {
                finish: &request.finish_url,
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_number = %request.order_number))]
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, GatewayError> {
        let body = SnapRequest::from_charge(&request)?;

        let response = self
            .client
            .post(self.charge_url())
            .basic_auth(&self.server_key, None::<&str>)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<SnapErrorBody>(&text)
                .ok()
                .filter(|b| !b.error_messages.is_empty())
                .map(|b| b.error_messages.join("; "))
                .unwrap_or(text);
            warn!(status = status.as_u16(), %message, "charge rejected by gateway");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SnapResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        info!("Charge created for order {}", request.order_number);
        Ok(ChargeResponse {
            transaction_id: parsed.token,
            redirect_url: parsed.redirect_url,
        })
    }
}
