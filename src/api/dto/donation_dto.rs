//! Donation and transaction DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{CauseProgress, Donation, GiftDetails, Transaction};

/// Gift dedication attached to a donation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GiftDto {
    /// Recipient display name.
    pub recipient_name: String,
    /// Recipient email address.
    pub recipient_email: String,
    /// Optional message.
    #[serde(default)]
    pub message: Option<String>,
}

impl From<GiftDto> for GiftDetails {
    fn from(dto: GiftDto) -> Self {
        Self {
            recipient_name: dto.recipient_name,
            recipient_email: dto.recipient_email,
            message: dto.message,
        }
    }
}

impl From<GiftDetails> for GiftDto {
    fn from(gift: GiftDetails) -> Self {
        Self {
            recipient_name: gift.recipient_name,
            recipient_email: gift.recipient_email,
            message: gift.message,
        }
    }
}

/// Payer details forwarded to the gateway invoice.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DonorDto {
    /// Display name on the invoice.
    #[serde(default)]
    pub name: Option<String>,
    /// Email for the gateway receipt.
    #[serde(default)]
    pub email: Option<String>,
    /// Mobile number.
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Request body for `POST /donations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDonationRequest {
    /// Cause to donate to.
    pub cause_id: Uuid,
    /// Donating user, if signed in.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Amount as a decimal string (e.g. `"200.000"`).
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// ISO-4217 currency code; the configured default when omitted.
    #[serde(default)]
    pub currency: Option<String>,
    /// Add the processing fee on top of the amount.
    #[serde(default)]
    pub cover_fee: bool,
    /// Hide the donor in public listings.
    #[serde(default)]
    pub is_anonymous: bool,
    /// Gift dedication.
    #[serde(default)]
    pub gift: Option<GiftDto>,
    /// Payer details.
    #[serde(default)]
    pub donor: DonorDto,
    /// Gateway payment method id; the hosted payment page when omitted.
    #[serde(default)]
    pub payment_method_id: Option<i64>,
}

/// Donation as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct DonationDto {
    /// Donation id.
    pub id: Uuid,
    /// Cause id.
    pub cause_id: Uuid,
    /// Owning user.
    pub user_id: Option<Uuid>,
    /// Amount credited to the cause.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Covered processing fee.
    #[schema(value_type = String)]
    pub covered_fee: Decimal,
    /// Charged total.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Anonymity flag.
    pub is_anonymous: bool,
    /// Gift flag.
    pub is_gift: bool,
    /// Gift dedication.
    pub gift: Option<GiftDto>,
    /// Gateway payment identifier.
    pub payment_id: Option<String>,
    /// Payment status.
    pub payment_status: String,
    /// First completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<Donation> for DonationDto {
    fn from(d: Donation) -> Self {
        Self {
            is_gift: d.is_gift(),
            id: *d.id.as_uuid(),
            cause_id: *d.cause_id.as_uuid(),
            user_id: d.user_id.map(Uuid::from),
            amount: d.amount,
            covered_fee: d.covered_fee,
            total_amount: d.total_amount,
            currency: d.currency,
            is_anonymous: d.is_anonymous,
            gift: d.gift.map(GiftDto::from),
            payment_id: d.payment_id,
            payment_status: d.payment_status.as_str().to_string(),
            completed_at: d.completed_at,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Gateway transaction as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionDto {
    /// Transaction id.
    pub id: Uuid,
    /// Owning donation.
    pub donation_id: Uuid,
    /// Payment method label.
    pub payment_method: String,
    /// Payment status.
    pub payment_status: String,
    /// Gateway invoice id.
    pub gateway_reference: Option<String>,
    /// Gateway payment id.
    pub gateway_payment_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionDto {
    fn from(t: Transaction) -> Self {
        Self {
            id: *t.id.as_uuid(),
            donation_id: *t.donation_id.as_uuid(),
            payment_method: t.payment_method,
            payment_status: t.payment_status.as_str().to_string(),
            gateway_reference: t.gateway_reference,
            gateway_payment_id: t.gateway_payment_id,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Response body for `POST /donations` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateDonationResponse {
    /// Stored donation.
    pub donation: DonationDto,
    /// Its transaction.
    pub transaction: TransactionDto,
    /// Gateway page to send the payer to.
    pub payment_url: String,
}

/// Response body for `GET /donations/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DonationDetailResponse {
    /// The donation.
    pub donation: DonationDto,
    /// Its current transaction.
    pub transaction: Option<TransactionDto>,
}

/// Response body for `GET /causes/{id}/progress`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CauseProgressDto {
    /// Cause id.
    pub cause_id: Uuid,
    /// Raised total.
    #[schema(value_type = String)]
    pub raised_amount: Decimal,
    /// Percentage of goal, capped at 100.
    #[schema(value_type = String)]
    pub progress_percentage: Decimal,
    /// Distinct donors with a completed donation.
    pub donor_count: u64,
}

impl From<CauseProgress> for CauseProgressDto {
    fn from(p: CauseProgress) -> Self {
        Self {
            cause_id: *p.cause_id.as_uuid(),
            raised_amount: p.raised_amount,
            progress_percentage: p.progress_percentage,
            donor_count: p.donor_count,
        }
    }
}
