//! Payment gateway contract.
//!
//! [`PaymentGateway`] is the only way the service talks to the external
//! payment provider. It carries no business logic: it opens invoices,
//! reports invoice status exactly as the provider states it, and lists the
//! payment methods available for an amount. The concrete implementation is
//! [`myfatoorah::MyFatoorahClient`].

pub mod myfatoorah;

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

pub use myfatoorah::MyFatoorahClient;

/// Failure classes of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure, timeout, or 5xx: the caller may retry later.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The provider refused the request as invalid: do not retry.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Returns `true` for [`GatewayError::Unavailable`].
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A gateway-side identifier and the kind of key it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GatewayReference {
    /// Invoice identifier, assigned when the invoice is created.
    Invoice(String),
    /// Payment identifier, assigned when the payer attempts a payment.
    Payment(String),
}

impl GatewayReference {
    /// Returns the raw identifier.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Invoice(v) | Self::Payment(v) => v,
        }
    }

    /// Returns the provider's key type name for this reference.
    #[must_use]
    pub const fn key_type(&self) -> &'static str {
        match self {
            Self::Invoice(_) => "InvoiceId",
            Self::Payment(_) => "PaymentId",
        }
    }
}

impl fmt::Display for GatewayReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_type(), self.value())
    }
}

/// Payer details forwarded to the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    /// Payer display name.
    pub name: String,
    /// Payer email address.
    pub email: Option<String>,
    /// Payer mobile number.
    pub mobile: Option<String>,
}

/// How the payer will settle the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSelector {
    /// Hosted payment page where the payer chooses the method.
    Link,
    /// A specific gateway payment method id.
    Method(i64),
}

impl MethodSelector {
    /// Label recorded on the local transaction.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Link => "link".to_string(),
            Self::Method(id) => format!("method:{id}"),
        }
    }
}

/// Input for [`PaymentGateway::create_invoice`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    /// Amount to charge.
    pub amount: Decimal,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Payer details.
    pub customer: CustomerInfo,
    /// Where the browser goes after a successful payment.
    pub callback_url: String,
    /// Where the browser goes after a failed payment.
    pub error_url: String,
    /// Local reference echoed by the gateway (the local transaction id).
    pub customer_reference: String,
    /// Payment method selection.
    pub method: MethodSelector,
}

/// An invoice opened at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    /// Gateway invoice identifier.
    pub invoice_id: String,
    /// URL the payer is redirected to.
    pub payment_url: String,
}

/// Invoice status exactly as the gateway reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceStatus {
    /// Gateway invoice identifier.
    pub invoice_id: String,
    /// Status string, passed through unchanged (e.g. `"Paid"`).
    pub status: String,
    /// Payment id of the most recent payment attempt, if any.
    pub payment_id: Option<String>,
    /// Full provider payload.
    pub raw: serde_json::Value,
}

/// A payment method offered by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMethod {
    /// Gateway method id, usable as [`MethodSelector::Method`].
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Short method code (e.g. `"kn"`, `"vm"`).
    pub code: Option<String>,
    /// Whether the method can be charged without a hosted page.
    pub is_direct: bool,
    /// Fee the gateway charges for this method.
    pub service_charge: Decimal,
    /// Total the payer would be charged.
    pub total_amount: Decimal,
    /// Currency of `total_amount`.
    pub currency: Option<String>,
    /// Logo URL.
    pub image_url: Option<String>,
}

/// Contract with the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Opens an invoice. Never retried internally: a retried create can
    /// produce duplicate invoices, so callers decide.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Unavailable`] on transport failure or timeout,
    /// [`GatewayError::Rejected`] if the provider refuses the request.
    async fn create_invoice(&self, request: &InvoiceRequest)
    -> Result<CreatedInvoice, GatewayError>;

    /// Fetches the authoritative status of an invoice.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Unavailable`] after one transient retry,
    /// [`GatewayError::Rejected`] if the reference is unknown to the provider.
    async fn get_invoice_status(
        &self,
        reference: &GatewayReference,
    ) -> Result<InvoiceStatus, GatewayError>;

    /// Lists payment methods for an amount. Informational only.
    ///
    /// # Errors
    ///
    /// Same classes as [`PaymentGateway::get_invoice_status`].
    async fn list_payment_methods(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<Vec<PaymentMethod>, GatewayError>;
}

/// Reads an id that the provider may send as a number or a string.
///
/// Blank strings and any other JSON type yield `None`.
#[must_use]
pub fn json_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
