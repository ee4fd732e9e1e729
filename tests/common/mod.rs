//! Shared harness: a scripted gateway and an in-memory application.

#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

use donation_ledger::api;
use donation_ledger::app_state::AppState;
use donation_ledger::config::AppConfig;
use donation_ledger::domain::Cause;
use donation_ledger::gateway::{
    CreatedInvoice, GatewayError, GatewayReference, InvoiceRequest, InvoiceStatus, PaymentGateway,
    PaymentMethod,
};
use donation_ledger::persistence::MemoryLedger;

/// Gateway double: invoices are numbered, statuses are set by the test.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    next_invoice: AtomicU32,
    statuses: Mutex<HashMap<String, (String, Option<String>)>>,
    status_calls: AtomicU32,
}

impl ScriptedGateway {
    /// Sets what the gateway reports for an invoice.
    pub fn set_status(&self, invoice_id: &str, status: &str, payment_id: Option<&str>) {
        if let Ok(mut map) = self.statuses.lock() {
            map.insert(
                invoice_id.to_string(),
                (status.to_string(), payment_id.map(str::to_string)),
            );
        }
    }

    /// Number of status reads served so far.
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_invoice(&self, _: &InvoiceRequest) -> Result<CreatedInvoice, GatewayError> {
        let n = self.next_invoice.fetch_add(1, Ordering::SeqCst) + 1;
        let invoice_id = format!("{}", 5_000_000 + n);
        self.set_status(&invoice_id, "Pending", None);
        Ok(CreatedInvoice {
            payment_url: format!("https://gateway.test/pay/{invoice_id}"),
            invoice_id,
        })
    }

    async fn get_invoice_status(
        &self,
        reference: &GatewayReference,
    ) -> Result<InvoiceStatus, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let Ok(map) = self.statuses.lock() else {
            return Err(GatewayError::Unavailable("poisoned".to_string()));
        };
        let found = match reference {
            GatewayReference::Invoice(id) => map.get(id).map(|s| (id.clone(), s.clone())),
            GatewayReference::Payment(pid) => map
                .iter()
                .find(|(_, (_, p))| p.as_deref() == Some(pid.as_str()))
                .map(|(id, s)| (id.clone(), s.clone())),
        };
        let Some((invoice_id, (status, payment_id))) = found else {
            return Err(GatewayError::Rejected("Invalid key".to_string()));
        };
        Ok(InvoiceStatus {
            raw: json!({ "InvoiceId": invoice_id, "InvoiceStatus": status }),
            invoice_id,
            status,
            payment_id,
        })
    }

    async fn list_payment_methods(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<Vec<PaymentMethod>, GatewayError> {
        Ok(vec![PaymentMethod {
            id: 1,
            name: "KNET".to_string(),
            code: Some("kn".to_string()),
            is_direct: false,
            service_charge: Decimal::ZERO,
            total_amount: amount,
            currency: Some(currency.to_string()),
            image_url: None,
        }])
    }
}

/// A running in-memory application.
#[derive(Debug)]
pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<ScriptedGateway>,
    pub state: AppState,
    pub cause: Cause,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        invoice_retry_base_ms: 1,
        gateway_timeout_secs: 2,
        success_redirect_url: "https://site.test/thanks".to_string(),
        failure_redirect_url: "https://site.test/sorry".to_string(),
        ..AppConfig::default()
    }
}

pub async fn spawn_app() -> TestApp {
    let config = test_config();
    let ledger = Arc::new(MemoryLedger::new());
    let cause = ledger
        .insert_cause("Water wells", Decimal::new(1000, 0))
        .await;
    let gateway = Arc::new(ScriptedGateway::default());

    let store: Arc<MemoryLedger> = Arc::clone(&ledger);
    let awards: Arc<MemoryLedger> = Arc::clone(&ledger);
    let gw: Arc<ScriptedGateway> = Arc::clone(&gateway);
    let state = AppState::build(&config, store, awards, gw);
    let router = api::build_app(state.clone(), Duration::from_secs(5));

    TestApp {
        router,
        ledger,
        gateway,
        state,
        cause,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        let Ok(response) = self.router.clone().oneshot(request).await else {
            panic!("router failed");
        };
        response
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let Ok(request) = Request::get(uri).body(Body::empty()) else {
            panic!("bad request");
        };
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response<Body> {
        let Ok(request) = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
        else {
            panic!("bad request");
        };
        self.send(request).await
    }

    /// Creates a 200.000 donation and returns `(donation_id, invoice_id)`.
    pub async fn donate(&self, user_id: Option<&str>) -> (String, String) {
        let response = self
            .post_json(
                "/api/v1/donations",
                &json!({
                    "cause_id": self.cause.id.to_string(),
                    "user_id": user_id,
                    "amount": "200.00",
                    "donor": { "name": "Huda", "email": "huda@example.com" },
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let Some(donation_id) = body.pointer("/donation/id").and_then(Value::as_str) else {
            panic!("no donation id in {body}");
        };
        let Some(invoice_id) = body
            .pointer("/transaction/gateway_reference")
            .and_then(Value::as_str)
        else {
            panic!("no invoice id in {body}");
        };
        (donation_id.to_string(), invoice_id.to_string())
    }

    pub async fn raised(&self) -> Decimal {
        let response = self
            .get(&format!("/api/v1/causes/{}/progress", self.cause.id))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let Some(Ok(raised)) = body
            .get("raised_amount")
            .and_then(Value::as_str)
            .map(str::parse::<Decimal>)
        else {
            panic!("no raised_amount in {body}");
        };
        raised
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body read failed");
    };
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
