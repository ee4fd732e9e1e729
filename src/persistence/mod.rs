//! Persistence layer: the ledger of donations, transactions, and causes.
//!
//! [`LedgerStore`] is the only write path for donation, transaction, and
//! cause rows. The central primitive is
//! [`LedgerStore::apply_terminal_transition`], a conditional update whose
//! affected-row count is the sole "did this happen for the first time"
//! signal; the cause total moves inside the same unit of work through
//! storage-level additive updates.
//!
//! Two implementations exist: [`postgres::PostgresLedger`] over
//! `sqlx::PgPool`, and [`memory::MemoryLedger`] for running without a
//! database and for tests.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AchievementAward, AchievementType, Cause, CauseId, CauseProgress, CompletedDonation,
    Donation, DonationId, GatewayCheck, NewDonation, NewGatewayCheck, PaymentStatus,
    Transaction, TransactionId, TransitionOutcome, UserId,
};
use crate::error::DonationError;

pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

/// Storage for donations, transactions, causes, and the gateway check log.
///
/// All methods return [`DonationError::PersistenceFailure`] on storage
/// failure unless stated otherwise.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Loads a cause.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn find_cause(&self, cause_id: CauseId) -> Result<Option<Cause>, DonationError>;

    /// Current raised amount, goal percentage and completed donation count.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn cause_progress(&self, cause_id: CauseId)
    -> Result<Option<CauseProgress>, DonationError>;

    /// Creates a donation and its first transaction, both `processing`.
    ///
    /// # Errors
    ///
    /// [`DonationError::CauseNotFound`] if the cause does not exist, or a
    /// storage failure.
    async fn insert_donation(
        &self,
        donation: &NewDonation,
    ) -> Result<(Donation, Transaction), DonationError>;

    /// Sets the transaction's gateway reference (once), mirrors it into the
    /// donation's payment id, and moves both to `initiated`.
    ///
    /// Returns `false` if the transaction already had a reference.
    ///
    /// # Errors
    ///
    /// [`DonationError::Internal`] if another transaction already holds the
    /// reference, or a storage failure.
    async fn attach_invoice(
        &self,
        transaction_id: TransactionId,
        invoice_id: &str,
    ) -> Result<bool, DonationError>;

    /// Records the gateway payment id on the transaction if none is set.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn attach_payment_id(
        &self,
        transaction_id: TransactionId,
        payment_id: &str,
    ) -> Result<bool, DonationError>;

    /// Loads a transaction by local id.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, DonationError>;

    /// Loads the transaction whose invoice id or payment id equals
    /// `reference`.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn find_transaction_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DonationError>;

    /// Loads a donation that has not been soft-deleted.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn find_donation(&self, donation_id: DonationId)
    -> Result<Option<Donation>, DonationError>;

    /// The donation's most recently updated transaction.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn current_transaction(
        &self,
        donation_id: DonationId,
    ) -> Result<Option<Transaction>, DonationError>;

    /// Appends a gateway status check to the audit log.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn record_gateway_check(&self, check: &NewGatewayCheck) -> Result<(), DonationError>;

    /// All status checks recorded for a transaction, oldest first.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn gateway_checks(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<GatewayCheck>, DonationError>;

    /// Conditionally moves the transaction from one of `from` to `to`.
    ///
    /// In the same unit of work, and only if the transaction row moved:
    /// mirrors the status onto the donation (if the donation is also in one
    /// of `from`), and when the donation moved into `completed` adds its
    /// amount to the cause's raised total, or when it moved into `refunded`
    /// subtracts it.
    ///
    /// # Errors
    ///
    /// Storage failure; nothing is written in that case.
    async fn apply_terminal_transition(
        &self,
        transaction_id: TransactionId,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<TransitionOutcome, DonationError>;
}

/// Storage for donor achievement awards.
#[async_trait]
pub trait AwardStore: Send + Sync + fmt::Debug {
    /// The user's completed donations.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn completed_donations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CompletedDonation>, DonationError>;

    /// Awards the user already holds.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn awards_for(&self, user_id: UserId) -> Result<Vec<AchievementAward>, DonationError>;

    /// Inserts the award unless the `(user, type)` pair already exists.
    /// Returns `true` only when a new row was written.
    ///
    /// # Errors
    ///
    /// Storage failure.
    async fn record_award(
        &self,
        user_id: UserId,
        achievement_type: AchievementType,
        achieved_at: DateTime<Utc>,
    ) -> Result<bool, DonationError>;
}
