//! Ledger aggregates: donations, their gateway transactions, and causes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{CauseId, DonationId, PaymentStatus, TransactionId, UserId};

/// Optional gift dedication attached to a donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftDetails {
    /// Recipient display name.
    pub recipient_name: String,
    /// Recipient email address.
    pub recipient_email: String,
    /// Free-form message to the recipient.
    pub message: Option<String>,
}

/// A donor's pledge of funds toward a [`Cause`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Donation {
    /// Donation identifier.
    pub id: DonationId,
    /// Cause the funds are pledged to.
    pub cause_id: CauseId,
    /// Owning user, `None` for donations made without an account.
    pub user_id: Option<UserId>,
    /// Requested amount credited to the cause.
    pub amount: Decimal,
    /// Processing fee the donor chose to cover.
    pub covered_fee: Decimal,
    /// `amount + covered_fee`, the sum charged by the gateway.
    pub total_amount: Decimal,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Hide the donor's identity in public listings.
    pub is_anonymous: bool,
    /// Gift dedication, present only for gift donations.
    pub gift: Option<GiftDetails>,
    /// Gateway-assigned identifier, `None` until the gateway responds.
    pub payment_id: Option<String>,
    /// Mirrored status of the current transaction.
    pub payment_status: PaymentStatus,
    /// Time of the first transition into `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Returns `true` when the donation carries a gift dedication.
    #[must_use]
    pub fn is_gift(&self) -> bool {
        self.gift.is_some()
    }
}

/// Validated input for creating a donation and its first transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDonation {
    /// Target cause.
    pub cause_id: CauseId,
    /// Owning user, if any.
    pub user_id: Option<UserId>,
    /// Requested amount.
    pub amount: Decimal,
    /// Covered processing fee (zero when not covered).
    pub covered_fee: Decimal,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Anonymity flag.
    pub is_anonymous: bool,
    /// Gift dedication.
    pub gift: Option<GiftDetails>,
    /// Payment method label recorded on the transaction.
    pub payment_method: String,
}

impl NewDonation {
    /// The amount the gateway must charge.
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.amount + self.covered_fee
    }
}

/// One concrete attempt to collect a donation's funds through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Local transaction identifier.
    pub id: TransactionId,
    /// Donation being collected.
    pub donation_id: DonationId,
    /// Payment method label (gateway method id or `"link"`).
    pub payment_method: String,
    /// Status of this attempt.
    pub payment_status: PaymentStatus,
    /// Gateway invoice id; set once, unique across transactions.
    pub gateway_reference: Option<String>,
    /// Gateway payment id reported by a status check; set once.
    pub gateway_payment_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Returns `true` if `reference` names this transaction at the gateway.
    #[must_use]
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.gateway_reference.as_deref() == Some(reference)
            || self.gateway_payment_id.as_deref() == Some(reference)
    }
}

/// Aggregate funding target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cause {
    /// Cause identifier.
    pub id: CauseId,
    /// Display title.
    pub title: String,
    /// Funding goal.
    pub goal_amount: Decimal,
    /// Sum of completed donation amounts minus refunded ones.
    pub raised_amount: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a cause's funding progress, as broadcast to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseProgress {
    /// Cause identifier.
    pub cause_id: CauseId,
    /// Current raised amount.
    pub raised_amount: Decimal,
    /// `raised / goal × 100`, capped at 100 and rounded to two places.
    pub progress_percentage: Decimal,
    /// Distinct donors with a completed donation; each guest donation counts once.
    pub donor_count: u64,
}

impl CauseProgress {
    /// Builds a progress snapshot from the cause's totals.
    #[must_use]
    pub fn new(cause_id: CauseId, goal: Decimal, raised: Decimal, donor_count: u64) -> Self {
        Self {
            cause_id,
            raised_amount: raised,
            progress_percentage: progress_percentage(goal, raised),
            donor_count,
        }
    }
}

fn progress_percentage(goal: Decimal, raised: Decimal) -> Decimal {
    if goal <= Decimal::ZERO || raised <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let hundred = Decimal::ONE_HUNDRED;
    (raised / goal * hundred).min(hundred).round_dp(2)
}

/// Which inbound path produced a gateway status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Caller-initiated verify request.
    Verify,
    /// Browser returning from the gateway.
    Callback,
    /// Gateway server-to-server notification.
    Webhook,
    /// Administrative refund.
    Refund,
}

impl SignalSource {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Callback => "callback",
            Self::Webhook => "webhook",
            Self::Refund => "refund",
        }
    }
}

/// A gateway status check to append to the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGatewayCheck {
    /// Transaction whose status was checked.
    pub transaction_id: TransactionId,
    /// Inbound path that triggered the check.
    pub source: SignalSource,
    /// Event type claimed by the inbound signal (webhooks only).
    pub hint: Option<String>,
    /// Status string exactly as reported by the gateway.
    pub gateway_status: String,
    /// Status after mapping onto the internal lattice.
    pub mapped_status: PaymentStatus,
    /// Raw gateway payload.
    pub payload: serde_json::Value,
}

/// A stored gateway status check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayCheck {
    /// Row identifier.
    pub id: i64,
    /// Transaction whose status was checked.
    pub transaction_id: TransactionId,
    /// Inbound path that triggered the check.
    pub source: String,
    /// Event type claimed by the inbound signal.
    pub hint: Option<String>,
    /// Status string exactly as reported by the gateway.
    pub gateway_status: String,
    /// Mapped status.
    pub mapped_status: PaymentStatus,
    /// Raw gateway payload.
    pub payload: serde_json::Value,
    /// When the check was recorded.
    pub checked_at: DateTime<Utc>,
}

/// Result of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionOutcome {
    /// The transaction row moved (exactly one row affected).
    pub was_applied: bool,
    /// The owning donation moved as well. For a completion this is the
    /// donation's first transition into `completed`.
    pub donation_transitioned: bool,
    /// The cause's raised amount after the additive update, when one ran.
    pub cause_raised: Option<Decimal>,
}

impl TransitionOutcome {
    /// Outcome for an update that matched no row.
    #[must_use]
    pub const fn not_applied() -> Self {
        Self {
            was_applied: false,
            donation_transitioned: false,
            cause_raised: None,
        }
    }
}
