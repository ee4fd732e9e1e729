//! MyFatoorah v2 REST client.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "IsSuccess": true, "Message": "", "ValidationErrors": null, "Data": { ... } }
//! ```
//!
//! The client unwraps the envelope, classifies failures into
//! [`GatewayError::Unavailable`] or [`GatewayError::Rejected`], and
//! normalizes `Data` into the [`super`] contract types. Numeric ids are
//! turned into strings; status strings are passed through untouched.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    CreatedInvoice, GatewayError, GatewayReference, InvoiceRequest, InvoiceStatus,
    MethodSelector, PaymentGateway, PaymentMethod, json_id,
};

const SEND_PAYMENT: &str = "/v2/SendPayment";
const EXECUTE_PAYMENT: &str = "/v2/ExecutePayment";
const GET_PAYMENT_STATUS: &str = "/v2/GetPaymentStatus";
const INITIATE_PAYMENT: &str = "/v2/InitiatePayment";

/// Response envelope shared by all MyFatoorah endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    is_success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    validation_errors: Option<Vec<ValidationError>>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidationError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the MyFatoorah API.
#[derive(Debug, Clone)]
pub struct MyFatoorahClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    budget: Duration,
    attempt_timeout: Duration,
    retry_delay: Duration,
}

impl MyFatoorahClient {
    /// Builds a client with the given base URL, API token and call budget.
    ///
    /// `budget` bounds a whole read including its retry: each HTTP attempt
    /// gets `(budget - retry_delay) / 2`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        budget: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        let retry_delay = Duration::from_millis(250);
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            budget,
            attempt_timeout: attempt_timeout(budget, retry_delay),
            retry_delay,
        })
    }

    /// Overrides the pause before the single transient retry of a read.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self.attempt_timeout = attempt_timeout(self.budget, delay);
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.attempt_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("{path}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("{path}: {e}")))?;

        if is_transient_status(status) {
            return Err(GatewayError::Unavailable(format!("{path}: http {status}")));
        }

        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                GatewayError::Unavailable(format!("{path}: malformed response: {e}"))
            } else {
                GatewayError::Rejected(format!("{path}: http {status}"))
            }
        })?;

        unwrap_envelope(path, envelope)
    }

    /// Read path: one retry on a transient failure.
    async fn post_read(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        match self.post(path, body).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(path, error = %err, "transient gateway error, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.post(path, body).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl PaymentGateway for MyFatoorahClient {
    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
    ) -> Result<CreatedInvoice, GatewayError> {
        let (path, body) = invoice_body(request)?;
        let data = self.post(path, &body).await?;
        let created = parse_created_invoice(&data)?;
        tracing::info!(invoice_id = %created.invoice_id, path, "gateway invoice created");
        Ok(created)
    }

    async fn get_invoice_status(
        &self,
        reference: &GatewayReference,
    ) -> Result<InvoiceStatus, GatewayError> {
        let body = json!({
            "Key": reference.value(),
            "KeyType": reference.key_type(),
        });
        let data = self.post_read(GET_PAYMENT_STATUS, &body).await?;
        parse_invoice_status(data)
    }

    async fn list_payment_methods(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<Vec<PaymentMethod>, GatewayError> {
        let body = json!({
            "InvoiceAmount": decimal_number(amount)?,
            "CurrencyIso": currency,
        });
        let data = self.post_read(INITIATE_PAYMENT, &body).await?;
        Ok(parse_payment_methods(&data))
    }
}

/// Per-attempt bound that leaves room for one retry inside `budget`.
fn attempt_timeout(budget: Duration, retry_delay: Duration) -> Duration {
    let attempt = budget.saturating_sub(retry_delay) / 2;
    attempt.max(Duration::from_millis(1))
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn unwrap_envelope(path: &str, envelope: Envelope) -> Result<Value, GatewayError> {
    if !envelope.is_success {
        let mut message = envelope.message.unwrap_or_default();
        for v in envelope.validation_errors.unwrap_or_default() {
            let field = v.name.unwrap_or_default();
            let error = v.error.unwrap_or_default();
            message.push_str(&format!("; {field}: {error}"));
        }
        return Err(GatewayError::Rejected(format!("{path}: {message}")));
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::Unavailable(format!("{path}: response without Data")))
}

fn invoice_body(request: &InvoiceRequest) -> Result<(&'static str, Value), GatewayError> {
    let mut body = json!({
        "InvoiceValue": decimal_number(request.amount)?,
        "DisplayCurrencyIso": request.currency,
        "CustomerName": request.customer.name,
        "CallBackUrl": request.callback_url,
        "ErrorUrl": request.error_url,
        "CustomerReference": request.customer_reference,
        "Language": "en",
    });
    if let Some(obj) = body.as_object_mut() {
        if let Some(email) = &request.customer.email {
            obj.insert("CustomerEmail".to_string(), json!(email));
        }
        if let Some(mobile) = &request.customer.mobile {
            obj.insert("CustomerMobile".to_string(), json!(mobile));
        }
        match request.method {
            MethodSelector::Link => {
                obj.insert("NotificationOption".to_string(), json!("LNK"));
            }
            MethodSelector::Method(id) => {
                obj.insert("PaymentMethodId".to_string(), json!(id));
            }
        }
    }
    let path = match request.method {
        MethodSelector::Link => SEND_PAYMENT,
        MethodSelector::Method(_) => EXECUTE_PAYMENT,
    };
    Ok((path, body))
}

/// The API expects JSON numbers for amounts. The decimal text is kept
/// verbatim, never routed through `f64`.
fn decimal_number(amount: Decimal) -> Result<Value, GatewayError> {
    let text = amount.round_dp(3).normalize().to_string();
    serde_json::Number::from_str(&text)
        .map(Value::Number)
        .map_err(|_| GatewayError::Rejected(format!("amount not representable: {amount}")))
}


fn decimal_field(value: Option<&Value>) -> Decimal {
    let text = match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Decimal::ZERO,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap_or(Decimal::ZERO)
}

fn parse_created_invoice(data: &Value) -> Result<CreatedInvoice, GatewayError> {
    let invoice_id = json_id(data.get("InvoiceId"))
        .ok_or_else(|| GatewayError::Unavailable("invoice response without InvoiceId".into()))?;
    let payment_url = data
        .get("InvoiceURL")
        .or_else(|| data.get("PaymentURL"))
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Unavailable("invoice response without payment URL".into()))?
        .to_string();
    Ok(CreatedInvoice {
        invoice_id,
        payment_url,
    })
}

fn parse_invoice_status(data: Value) -> Result<InvoiceStatus, GatewayError> {
    let invoice_id = json_id(data.get("InvoiceId"))
        .ok_or_else(|| GatewayError::Unavailable("status response without InvoiceId".into()))?;
    let status = data
        .get("InvoiceStatus")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    // The most recent attempt is listed last.
    let payment_id = data
        .get("InvoiceTransactions")
        .and_then(Value::as_array)
        .and_then(|txns| txns.iter().rev().find_map(|t| json_id(t.get("PaymentId"))));
    Ok(InvoiceStatus {
        invoice_id,
        status,
        payment_id,
        raw: data,
    })
}

fn parse_payment_methods(data: &Value) -> Vec<PaymentMethod> {
    data.get("PaymentMethods")
        .and_then(Value::as_array)
        .map(|methods| {
            methods
                .iter()
                .filter_map(|m| {
                    let id = m.get("PaymentMethodId").and_then(Value::as_i64)?;
                    Some(PaymentMethod {
                        id,
                        name: m
                            .get("PaymentMethodEn")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        code: m
                            .get("PaymentMethodCode")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        is_direct: m
                            .get("IsDirectPayment")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        service_charge: decimal_field(m.get("ServiceCharge")),
                        total_amount: decimal_field(m.get("TotalAmount")),
                        currency: m.get("CurrencyIso").and_then(Value::as_str).map(str::to_string),
                        image_url: m.get("ImageUrl").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::post;

    use super::*;
    use crate::gateway::CustomerInfo;

    fn request(method: MethodSelector) -> InvoiceRequest {
        InvoiceRequest {
            amount: Decimal::new(20000, 2),
            currency: "KWD".to_string(),
            customer: CustomerInfo {
                name: "Donor".to_string(),
                email: Some("donor@example.com".to_string()),
                mobile: None,
            },
            callback_url: "https://app.test/api/v1/payments/callback".to_string(),
            error_url: "https://app.test/api/v1/payments/callback".to_string(),
            customer_reference: "txn-1".to_string(),
            method,
        }
    }

    async fn serve(app: Router) -> String {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client(base: String) -> MyFatoorahClient {
        let Ok(client) = MyFatoorahClient::new(base, "token", Duration::from_secs(5)) else {
            panic!("client build failed");
        };
        client.with_retry_delay(Duration::from_millis(1))
    }

    #[test]
    fn link_invoices_use_send_payment() {
        let Ok((path, body)) = invoice_body(&request(MethodSelector::Link)) else {
            panic!("body");
        };
        assert_eq!(path, SEND_PAYMENT);
        assert_eq!(body["NotificationOption"], "LNK");
        assert_eq!(body["InvoiceValue"].to_string(), "200");
        assert_eq!(body["CustomerEmail"], "donor@example.com");
        assert!(body.get("CustomerMobile").is_none());
    }

    #[test]
    fn method_invoices_use_execute_payment() {
        let Ok((path, body)) = invoice_body(&request(MethodSelector::Method(2))) else {
            panic!("body");
        };
        assert_eq!(path, EXECUTE_PAYMENT);
        assert_eq!(body["PaymentMethodId"], 2);
    }

    #[test]
    fn status_passes_unknown_strings_through() {
        let data = json!({
            "InvoiceId": 51234,
            "InvoiceStatus": "PartiallyPaid",
            "InvoiceTransactions": [
                { "PaymentId": "070001", "TransactionStatus": "Failed" },
                { "PaymentId": "070002", "TransactionStatus": "InProgress" }
            ]
        });
        let Ok(status) = parse_invoice_status(data) else {
            panic!("status parse failed");
        };
        assert_eq!(status.invoice_id, "51234");
        assert_eq!(status.status, "PartiallyPaid");
        assert_eq!(status.payment_id.as_deref(), Some("070002"));
    }

    #[test]
    fn failed_envelope_is_rejected_with_validation_detail() {
        let envelope = Envelope {
            is_success: false,
            message: Some("Invalid data".to_string()),
            validation_errors: Some(vec![ValidationError {
                name: Some("InvoiceValue".to_string()),
                error: Some("must be positive".to_string()),
            }]),
            data: None,
        };
        let Err(GatewayError::Rejected(msg)) = unwrap_envelope(SEND_PAYMENT, envelope) else {
            panic!("expected rejection");
        };
        assert!(msg.contains("InvoiceValue: must be positive"));
    }

    #[test]
    fn methods_normalize_amounts() {
        let data = json!({
            "PaymentMethods": [
                { "PaymentMethodId": 1, "PaymentMethodEn": "KNET", "PaymentMethodCode": "kn",
                  "IsDirectPayment": false, "ServiceCharge": 0.25, "TotalAmount": 200.25,
                  "CurrencyIso": "KWD" },
                { "PaymentMethodEn": "missing id" }
            ]
        });
        let methods = parse_payment_methods(&data);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].service_charge, Decimal::new(25, 2));
        assert_eq!(methods[0].total_amount, Decimal::new(20025, 2));
    }

    #[tokio::test]
    async fn status_read_retries_once_after_server_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            GET_PAYMENT_STATUS,
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return AxumStatus::BAD_GATEWAY.into_response();
                    }
                    Json(json!({
                        "IsSuccess": true,
                        "Message": "",
                        "Data": { "InvoiceId": 77, "InvoiceStatus": "Paid" }
                    }))
                    .into_response()
                }
            }),
        );
        let gateway = client(serve(app).await);

        let result = gateway
            .get_invoice_status(&GatewayReference::Invoice("77".to_string()))
            .await;
        let Ok(status) = result else {
            panic!("expected status after retry");
        };
        assert_eq!(status.status, "Paid");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn amounts_keep_their_decimal_digits() {
        let Ok(value) = decimal_number(Decimal::new(12345, 3)) else {
            panic!("amount");
        };
        assert_eq!(value.to_string(), "12.345");
        let Ok(value) = decimal_number(Decimal::new(110, 2)) else {
            panic!("amount");
        };
        assert_eq!(value.to_string(), "1.1");
        let Ok(value) = decimal_number(Decimal::new(100_004, 4)) else {
            panic!("amount");
        };
        assert_eq!(value.to_string(), "10");
    }

    #[test]
    fn attempts_leave_room_for_the_retry() {
        let attempt = attempt_timeout(Duration::from_secs(10), Duration::from_millis(250));
        assert_eq!(attempt, Duration::from_millis(4_875));
        assert!(attempt * 2 + Duration::from_millis(250) <= Duration::from_secs(10));
        assert_eq!(
            attempt_timeout(Duration::ZERO, Duration::from_millis(250)),
            Duration::from_millis(1)
        );
    }

    #[tokio::test]
    async fn stalled_first_read_is_retried_within_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            GET_PAYMENT_STATUS,
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Json(json!({
                        "IsSuccess": true,
                        "Data": { "InvoiceId": 78, "InvoiceStatus": "Paid" }
                    }))
                }
            }),
        );
        let budget = Duration::from_millis(600);
        let Ok(gateway) = MyFatoorahClient::new(serve(app).await, "token", budget) else {
            panic!("client build failed");
        };
        let gateway = gateway.with_retry_delay(Duration::from_millis(10));

        let result = tokio::time::timeout(
            budget,
            gateway.get_invoice_status(&GatewayReference::Invoice("78".to_string())),
        )
        .await;
        let Ok(Ok(status)) = result else {
            panic!("expected status from the retry within the budget");
        };
        assert_eq!(status.status, "Paid");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn create_invoice_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            SEND_PAYMENT,
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::SERVICE_UNAVAILABLE
                }
            }),
        );
        let gateway = client(serve(app).await);

        let result = gateway.create_invoice(&request(MethodSelector::Link)).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_invoice_reads_invoice_url() {
        let app = Router::new().route(
            SEND_PAYMENT,
            post(|| async {
                Json(json!({
                    "IsSuccess": true,
                    "Data": { "InvoiceId": 51234, "InvoiceURL": "https://pay.test/51234" }
                }))
            }),
        );
        let gateway = client(serve(app).await);

        let Ok(created) = gateway.create_invoice(&request(MethodSelector::Link)).await else {
            panic!("invoice creation failed");
        };
        assert_eq!(created.invoice_id, "51234");
        assert_eq!(created.payment_url, "https://pay.test/51234");
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let app = Router::new().route(
            GET_PAYMENT_STATUS,
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(json!({ "IsSuccess": false, "Message": "Invalid key" })),
                )
            }),
        );
        let gateway = client(serve(app).await);

        let result = gateway
            .get_invoice_status(&GatewayReference::Payment("nope".to_string()))
            .await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
    }
}
