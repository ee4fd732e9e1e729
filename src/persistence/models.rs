//! Database row models and their conversion into domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    AchievementAward, AchievementType, Cause, CauseId, Donation, DonationId, GatewayCheck,
    GiftDetails, PaymentStatus, Transaction, TransactionId, UserId,
};
use crate::error::DonationError;

fn status(s: &str) -> Result<PaymentStatus, DonationError> {
    s.parse()
        .map_err(|e: crate::domain::payment_status::UnknownStatus| {
            DonationError::PersistenceFailure(e.to_string())
        })
}

/// A row from the `causes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CauseRow {
    /// Cause id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Funding goal.
    pub goal_amount: Decimal,
    /// Raised total.
    pub raised_amount: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<CauseRow> for Cause {
    fn from(row: CauseRow) -> Self {
        Self {
            id: CauseId::from_uuid(row.id),
            title: row.title,
            goal_amount: row.goal_amount,
            raised_amount: row.raised_amount,
            created_at: row.created_at,
        }
    }
}

/// A row from the `donations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonationRow {
    /// Donation id.
    pub id: Uuid,
    /// Cause id.
    pub cause_id: Uuid,
    /// Owning user.
    pub user_id: Option<Uuid>,
    /// Requested amount.
    pub amount: Decimal,
    /// Covered processing fee.
    pub covered_fee: Decimal,
    /// Amount plus covered fee.
    pub total_amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Anonymity flag.
    pub is_anonymous: bool,
    /// Gift flag.
    pub is_gift: bool,
    /// Gift recipient name.
    pub gift_recipient_name: Option<String>,
    /// Gift recipient email.
    pub gift_recipient_email: Option<String>,
    /// Gift message.
    pub gift_message: Option<String>,
    /// Gateway payment identifier.
    pub payment_id: Option<String>,
    /// Status string.
    pub payment_status: String,
    /// First completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DonationRow> for Donation {
    type Error = DonationError;

    fn try_from(row: DonationRow) -> Result<Self, Self::Error> {
        let gift = if row.is_gift {
            Some(GiftDetails {
                recipient_name: row.gift_recipient_name.unwrap_or_default(),
                recipient_email: row.gift_recipient_email.unwrap_or_default(),
                message: row.gift_message,
            })
        } else {
            None
        };
        Ok(Self {
            id: DonationId::from_uuid(row.id),
            cause_id: CauseId::from_uuid(row.cause_id),
            user_id: row.user_id.map(UserId::from_uuid),
            amount: row.amount,
            covered_fee: row.covered_fee,
            total_amount: row.total_amount,
            currency: row.currency,
            is_anonymous: row.is_anonymous,
            gift,
            payment_id: row.payment_id,
            payment_status: status(&row.payment_status)?,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    /// Transaction id.
    pub id: Uuid,
    /// Donation id.
    pub donation_id: Uuid,
    /// Payment method label.
    pub payment_method: String,
    /// Status string.
    pub payment_status: String,
    /// Gateway invoice id.
    pub gateway_reference: Option<String>,
    /// Gateway payment id.
    pub gateway_payment_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DonationError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransactionId::from_uuid(row.id),
            donation_id: DonationId::from_uuid(row.donation_id),
            payment_method: row.payment_method,
            payment_status: status(&row.payment_status)?,
            gateway_reference: row.gateway_reference,
            gateway_payment_id: row.gateway_payment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `gateway_checks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GatewayCheckRow {
    /// Auto-increment row id.
    pub id: i64,
    /// Transaction id.
    pub transaction_id: Uuid,
    /// Signal source.
    pub source: String,
    /// Event type hint.
    pub hint: Option<String>,
    /// Raw gateway status.
    pub gateway_status: String,
    /// Mapped status string.
    pub mapped_status: String,
    /// JSONB payload.
    pub payload: serde_json::Value,
    /// Check timestamp.
    pub checked_at: DateTime<Utc>,
}

impl TryFrom<GatewayCheckRow> for GatewayCheck {
    type Error = DonationError;

    fn try_from(row: GatewayCheckRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            transaction_id: TransactionId::from_uuid(row.transaction_id),
            source: row.source,
            hint: row.hint,
            gateway_status: row.gateway_status,
            mapped_status: status(&row.mapped_status)?,
            payload: row.payload,
            checked_at: row.checked_at,
        })
    }
}

/// A row from the `achievement_awards` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AwardRow {
    /// Award holder.
    pub user_id: Uuid,
    /// Achievement type string.
    pub achievement_type: String,
    /// Award timestamp.
    pub achieved_at: DateTime<Utc>,
}

impl TryFrom<AwardRow> for AchievementAward {
    type Error = DonationError;

    fn try_from(row: AwardRow) -> Result<Self, Self::Error> {
        let achievement_type: AchievementType = row
            .achievement_type
            .parse()
            .map_err(DonationError::PersistenceFailure)?;
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            achievement_type,
            achieved_at: row.achieved_at,
        })
    }
}
