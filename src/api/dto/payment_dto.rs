//! Payment signal DTOs: verify, callback, webhook, payment methods.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::donation_dto::{DonationDto, TransactionDto};
use crate::gateway::{PaymentMethod, json_id};
use crate::service::{ReconcileOutcome, ReconcileResult};

/// Reconciled payment view returned by verify and refund.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// `applied`, `unchanged` or `conflict`.
    pub result: String,
    /// Payment status after reconciliation.
    pub status: String,
    /// Raw status string reported by the gateway.
    pub gateway_status: Option<String>,
    /// The donation.
    pub donation: DonationDto,
    /// Its transaction.
    pub transaction: TransactionDto,
    /// Achievements awarded by this call.
    pub awarded_achievements: Vec<String>,
}

impl From<ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let result = match outcome.result {
            ReconcileResult::Applied(_) => "applied",
            ReconcileResult::Unchanged => "unchanged",
            ReconcileResult::Conflict { .. } => "conflict",
        };
        Self {
            result: result.to_string(),
            status: outcome.transaction.payment_status.as_str().to_string(),
            gateway_status: outcome.gateway_status,
            awarded_achievements: outcome
                .awards
                .iter()
                .map(|a| a.achievement_type.as_str().to_string())
                .collect(),
            donation: outcome.donation.into(),
            transaction: outcome.transaction.into(),
        }
    }
}

/// Query string of the gateway's browser redirect.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Gateway payment id.
    #[serde(rename = "paymentId", alias = "PaymentId")]
    pub payment_id: Option<String>,
    /// Secondary id the gateway appends; used when `paymentId` is absent.
    #[serde(rename = "Id", alias = "id")]
    pub id: Option<String>,
}

impl CallbackQuery {
    /// The payment id to reconcile, if any was supplied.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        [self.payment_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Webhook body posted by the gateway.
///
/// Both fields may arrive as JSON strings or numbers.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookPayload {
    /// Event name; recorded as a hint only.
    #[serde(default, deserialize_with = "string_or_number")]
    pub event_type: Option<String>,
    /// Gateway invoice or payment id the event refers to.
    #[serde(default, deserialize_with = "string_or_number")]
    pub resource_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(json_id(value.as_ref()))
}

/// Acknowledgement returned to the webhook caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Whether the event was matched and processed.
    pub success: bool,
    /// Short explanation.
    pub message: String,
}

/// Query string for `GET /payment-methods`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentMethodsQuery {
    /// Amount to price methods for.
    #[param(value_type = String)]
    pub amount: Decimal,
    /// Currency code; the configured default when omitted.
    #[serde(default)]
    pub currency: Option<String>,
}

/// A payment method as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentMethodDto {
    /// Gateway method id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Method code.
    pub code: Option<String>,
    /// Direct payment supported.
    pub is_direct: bool,
    /// Gateway service charge.
    #[schema(value_type = String)]
    pub service_charge: Decimal,
    /// Total the payer would be charged.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Currency of the total.
    pub currency: Option<String>,
    /// Logo URL.
    pub image_url: Option<String>,
}

impl From<PaymentMethod> for PaymentMethodDto {
    fn from(m: PaymentMethod) -> Self {
        Self {
            id: m.id,
            name: m.name,
            code: m.code,
            is_direct: m.is_direct,
            service_charge: m.service_charge,
            total_amount: m.total_amount,
            currency: m.currency,
            image_url: m.image_url,
        }
    }
}
