//! In-process ledger for running without a database.
//!
//! All state sits behind one [`tokio::sync::RwLock`]; every mutating call
//! takes the write lock for its whole unit of work, which gives the same
//! compare-and-swap semantics as the conditional updates in
//! [`super::postgres::PostgresLedger`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{AwardStore, LedgerStore};
use crate::domain::{
    AchievementAward, AchievementType, Cause, CauseId, CauseProgress, CompletedDonation,
    Donation, DonationId, GatewayCheck, NewDonation, NewGatewayCheck, PaymentStatus,
    Transaction, TransactionId, TransitionOutcome, UserId,
};
use crate::error::DonationError;

#[derive(Debug, Default)]
struct LedgerState {
    causes: HashMap<CauseId, Cause>,
    donations: HashMap<DonationId, Donation>,
    transactions: HashMap<TransactionId, Transaction>,
    checks: Vec<GatewayCheck>,
    awards: HashMap<(UserId, AchievementType), AchievementAward>,
}

impl LedgerState {
    fn increment_cause_raised(&mut self, cause_id: CauseId, amount: Decimal) -> Option<Decimal> {
        let cause = self.causes.get_mut(&cause_id)?;
        cause.raised_amount += amount;
        Some(cause.raised_amount)
    }

    fn decrement_cause_raised(&mut self, cause_id: CauseId, amount: Decimal) -> Option<Decimal> {
        let cause = self.causes.get_mut(&cause_id)?;
        cause.raised_amount -= amount;
        Some(cause.raised_amount)
    }

    fn reference_taken(&self, reference: &str, except: TransactionId) -> bool {
        self.transactions
            .values()
            .any(|t| t.id != except && t.matches_reference(reference))
    }
}

/// Ledger kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cause with a zero raised amount.
    pub async fn insert_cause(&self, title: impl Into<String>, goal_amount: Decimal) -> Cause {
        let cause = Cause {
            id: CauseId::new(),
            title: title.into(),
            goal_amount,
            raised_amount: Decimal::ZERO,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .causes
            .insert(cause.id, cause.clone());
        cause
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn find_cause(&self, cause_id: CauseId) -> Result<Option<Cause>, DonationError> {
        Ok(self.state.read().await.causes.get(&cause_id).cloned())
    }

    async fn cause_progress(
        &self,
        cause_id: CauseId,
    ) -> Result<Option<CauseProgress>, DonationError> {
        let state = self.state.read().await;
        let Some(cause) = state.causes.get(&cause_id) else {
            return Ok(None);
        };
        // Signed-in donors count once; each guest donation is its own donor.
        let mut users = HashSet::new();
        let mut guests = 0u64;
        for d in state
            .donations
            .values()
            .filter(|d| d.cause_id == cause_id && d.payment_status == PaymentStatus::Completed)
        {
            match d.user_id {
                Some(user_id) => {
                    users.insert(user_id);
                }
                None => guests += 1,
            }
        }
        let donor_count = u64::try_from(users.len()).unwrap_or(u64::MAX) + guests;
        Ok(Some(CauseProgress::new(
            cause_id,
            cause.goal_amount,
            cause.raised_amount,
            donor_count,
        )))
    }

    async fn insert_donation(
        &self,
        new: &NewDonation,
    ) -> Result<(Donation, Transaction), DonationError> {
        let mut state = self.state.write().await;
        if !state.causes.contains_key(&new.cause_id) {
            return Err(DonationError::CauseNotFound(*new.cause_id.as_uuid()));
        }

        let now = Utc::now();
        let donation = Donation {
            id: DonationId::new(),
            cause_id: new.cause_id,
            user_id: new.user_id,
            amount: new.amount,
            covered_fee: new.covered_fee,
            total_amount: new.total_amount(),
            currency: new.currency.clone(),
            is_anonymous: new.is_anonymous,
            gift: new.gift.clone(),
            payment_id: None,
            payment_status: PaymentStatus::Processing,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = Transaction {
            id: TransactionId::new(),
            donation_id: donation.id,
            payment_method: new.payment_method.clone(),
            payment_status: PaymentStatus::Processing,
            gateway_reference: None,
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        state.donations.insert(donation.id, donation.clone());
        state.transactions.insert(transaction.id, transaction.clone());
        Ok((donation, transaction))
    }

    async fn attach_invoice(
        &self,
        transaction_id: TransactionId,
        invoice_id: &str,
    ) -> Result<bool, DonationError> {
        let mut state = self.state.write().await;
        if state.reference_taken(invoice_id, transaction_id) {
            return Err(DonationError::Internal(format!(
                "gateway reference {invoice_id} already attached to another transaction"
            )));
        }
        let now = Utc::now();
        let opens = PaymentStatus::Initiated.predecessors();

        let Some(txn) = state.transactions.get_mut(&transaction_id) else {
            return Ok(false);
        };
        if txn.gateway_reference.is_some() {
            return Ok(false);
        }
        txn.gateway_reference = Some(invoice_id.to_string());
        if opens.contains(&txn.payment_status) {
            txn.payment_status = PaymentStatus::Initiated;
        }
        txn.updated_at = now;
        let donation_id = txn.donation_id;

        if let Some(donation) = state.donations.get_mut(&donation_id) {
            if donation.payment_id.is_none() {
                donation.payment_id = Some(invoice_id.to_string());
            }
            if opens.contains(&donation.payment_status) {
                donation.payment_status = PaymentStatus::Initiated;
            }
            donation.updated_at = now;
        }
        Ok(true)
    }

    async fn attach_payment_id(
        &self,
        transaction_id: TransactionId,
        payment_id: &str,
    ) -> Result<bool, DonationError> {
        let mut state = self.state.write().await;
        if state.reference_taken(payment_id, transaction_id) {
            return Ok(false);
        }
        match state.transactions.get_mut(&transaction_id) {
            Some(txn) if txn.gateway_payment_id.is_none() => {
                txn.gateway_payment_id = Some(payment_id.to_string());
                txn.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, DonationError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .get(&transaction_id)
            .cloned())
    }

    async fn find_transaction_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DonationError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .find(|t| t.matches_reference(reference))
            .cloned())
    }

    async fn find_donation(
        &self,
        donation_id: DonationId,
    ) -> Result<Option<Donation>, DonationError> {
        Ok(self.state.read().await.donations.get(&donation_id).cloned())
    }

    async fn current_transaction(
        &self,
        donation_id: DonationId,
    ) -> Result<Option<Transaction>, DonationError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|t| t.donation_id == donation_id)
            .max_by_key(|t| (t.updated_at, t.created_at))
            .cloned())
    }

    async fn record_gateway_check(&self, check: &NewGatewayCheck) -> Result<(), DonationError> {
        let mut state = self.state.write().await;
        let id = i64::try_from(state.checks.len()).unwrap_or(i64::MAX).saturating_add(1);
        state.checks.push(GatewayCheck {
            id,
            transaction_id: check.transaction_id,
            source: check.source.as_str().to_string(),
            hint: check.hint.clone(),
            gateway_status: check.gateway_status.clone(),
            mapped_status: check.mapped_status,
            payload: check.payload.clone(),
            checked_at: Utc::now(),
        });
        Ok(())
    }

    async fn gateway_checks(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<GatewayCheck>, DonationError> {
        Ok(self
            .state
            .read()
            .await
            .checks
            .iter()
            .filter(|c| c.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn apply_terminal_transition(
        &self,
        transaction_id: TransactionId,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<TransitionOutcome, DonationError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let donation_id = match state.transactions.get_mut(&transaction_id) {
            Some(txn) if from.contains(&txn.payment_status) => {
                txn.payment_status = to;
                txn.updated_at = now;
                txn.donation_id
            }
            _ => return Ok(TransitionOutcome::not_applied()),
        };

        let moved = match state.donations.get_mut(&donation_id) {
            Some(donation) if from.contains(&donation.payment_status) => {
                donation.payment_status = to;
                donation.updated_at = now;
                if to == PaymentStatus::Completed {
                    donation.completed_at = Some(now);
                }
                Some((donation.cause_id, donation.amount))
            }
            _ => None,
        };

        let cause_raised = match (moved, to) {
            (Some((cause_id, amount)), PaymentStatus::Completed) => {
                state.increment_cause_raised(cause_id, amount)
            }
            (Some((cause_id, amount)), PaymentStatus::Refunded) => {
                state.decrement_cause_raised(cause_id, amount)
            }
            _ => None,
        };

        Ok(TransitionOutcome {
            was_applied: true,
            donation_transitioned: moved.is_some(),
            cause_raised,
        })
    }
}

#[async_trait]
impl AwardStore for MemoryLedger {
    async fn completed_donations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CompletedDonation>, DonationError> {
        let state = self.state.read().await;
        let mut history: Vec<CompletedDonation> = state
            .donations
            .values()
            .filter(|d| d.user_id == Some(user_id) && d.payment_status == PaymentStatus::Completed)
            .map(|d| CompletedDonation {
                amount: d.amount,
                completed_at: d.completed_at.unwrap_or(d.updated_at),
            })
            .collect();
        history.sort_by_key(|d| d.completed_at);
        Ok(history)
    }

    async fn awards_for(&self, user_id: UserId) -> Result<Vec<AchievementAward>, DonationError> {
        let state = self.state.read().await;
        let mut awards: Vec<AchievementAward> = state
            .awards
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        awards.sort_by_key(|a| (a.achieved_at, a.achievement_type));
        Ok(awards)
    }

    async fn record_award(
        &self,
        user_id: UserId,
        achievement_type: AchievementType,
        achieved_at: DateTime<Utc>,
    ) -> Result<bool, DonationError> {
        let mut state = self.state.write().await;
        let key = (user_id, achievement_type);
        if state.awards.contains_key(&key) {
            return Ok(false);
        }
        state.awards.insert(
            key,
            AchievementAward {
                user_id,
                achievement_type,
                achieved_at,
            },
        );
        Ok(true)
    }
}
