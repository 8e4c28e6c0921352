#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wisata_api::{
    config::AppConfig,
    db,
    entities::ticket,
    events::{self, EventSender},
    gateway::{ChargeRequest, ChargeResponse, GatewayError, PaymentGateway},
    handlers::common::USER_ID_HEADER,
    services::commerce::CreateTicketInput,
    AppState,
};

/// Gateway double: records every charge request and can be switched to fail.
#[derive(Default)]
pub struct StubGateway {
    failing: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChargeRequest>>,
}

impl StubGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChargeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let order_number = request.order_number.clone();
        self.requests.lock().unwrap().push(request);

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 503,
                message: "gateway down".to_string(),
            });
        }
        Ok(ChargeResponse {
            transaction_id: format!("tx-{}-{}", order_number, n),
            redirect_url: format!("https://pay.test/{}", order_number),
        })
    }
}

/// Application state on a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // one connection, otherwise every pool member gets its own empty database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_gateway.finish_url = "https://shop.test/finish".to_string();
        cfg.payment_gateway.failure_url = "https://shop.test/failed".to_string();
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(StubGateway::default());
        let state = AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            event_sender,
            gateway.clone(),
        );
        let router = wisata_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Sends a request, optionally as `user`, with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<Uuid>,
    ) -> Response {
        self.request_with_headers(method, uri, body, user, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<Uuid>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header(USER_ID_HEADER, id.to_string());
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Posts a raw body to the callback endpoint.
    pub async fn post_raw(&self, uri: &str, body: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_ticket(&self, price: Decimal, stock: i32) -> ticket::Model {
        self.seed_ticket_named("Candi Borobudur", price, stock).await
    }

    pub async fn seed_ticket_named(&self, name: &str, price: Decimal, stock: i32) -> ticket::Model {
        self.state
            .services
            .tickets
            .create_ticket(
                Uuid::new_v4(),
                CreateTicketInput {
                    name: name.to_string(),
                    destination: "Magelang".to_string(),
                    province: Some("Jawa Tengah".to_string()),
                    description: None,
                    price,
                    stock,
                    is_active: Some(true),
                },
            )
            .await
            .expect("seed ticket for tests")
    }

    pub async fn ticket_stock(&self, id: Uuid) -> i32 {
        self.state
            .services
            .tickets
            .get_ticket(id)
            .await
            .expect("ticket exists")
            .stock
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn checkout_body() -> Value {
    serde_json::json!({
        "customer_name": "Sari Dewi",
        "customer_email": "sari@example.com",
        "customer_phone": "081234567890",
        "payment_method": "bank_transfer"
    })
}

pub async fn response_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    };
    (status, value)
}
