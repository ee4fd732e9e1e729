//! Reconciliation of gateway outcome signals onto the ledger.
//!
//! Verify requests, browser callbacks and webhooks all end in
//! [`ReconciliationEngine::reconcile`]: resolve the local transaction, ask
//! the gateway for the authoritative status, map it onto the status
//! lattice and apply the result through the ledger's conditional update.
//! The conditional update's affected-row count is the only signal that
//! gates side effects, so any number of duplicate or concurrent signals
//! credit a cause exactly once.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    AchievementAward, Donation, DonationId, NewGatewayCheck, PaymentStatus, SignalSource,
    StatusDecision, Transaction, TransactionId, TransitionOutcome,
};
use crate::error::DonationError;
use crate::gateway::{GatewayError, GatewayReference, InvoiceStatus, PaymentGateway};
use crate::persistence::LedgerStore;
use crate::service::{AchievementEvaluator, ProgressBroadcaster};

/// What a reconciliation did to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// This call moved the transaction into the given status.
    Applied(PaymentStatus),
    /// Nothing changed: same status, non-terminal report, or another
    /// signal won the race.
    Unchanged,
    /// The report contradicted a terminal state, which was kept.
    Conflict {
        /// Status that was kept.
        current: PaymentStatus,
        /// Status the gateway reported.
        reported: PaymentStatus,
    },
}

impl ReconcileResult {
    /// Returns `true` if this call performed the transition.
    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Reconciled view returned to callers.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Transaction after reconciliation.
    pub transaction: Transaction,
    /// Owning donation after reconciliation.
    pub donation: Donation,
    /// What happened.
    pub result: ReconcileResult,
    /// Raw status string reported by the gateway, if it was asked.
    pub gateway_status: Option<String>,
    /// Achievements newly awarded as a side effect.
    pub awards: Vec<AchievementAward>,
}

/// Stateless coordinator of inbound payment signals.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    achievements: AchievementEvaluator,
    progress: ProgressBroadcaster,
    gateway_timeout: Duration,
}

impl ReconciliationEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        achievements: AchievementEvaluator,
        progress: ProgressBroadcaster,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            gateway,
            achievements,
            progress,
            gateway_timeout,
        }
    }

    /// Reconciles on an explicit verify request.
    ///
    /// `reference` may be a local transaction id, a local donation id, or
    /// a gateway invoice or payment id.
    ///
    /// # Errors
    ///
    /// [`DonationError::TransactionNotFound`] when nothing matches; gateway
    /// and storage errors otherwise.
    pub async fn handle_verify(&self, reference: &str) -> Result<ReconcileOutcome, DonationError> {
        let transaction = self.resolve_any(reference).await?;
        self.reconcile(transaction, SignalSource::Verify, None, None)
            .await
    }

    /// Reconciles on the payer's browser returning from the gateway.
    ///
    /// When no local transaction carries `payment_id` yet, the gateway is
    /// asked which invoice the payment belongs to and the local lookup is
    /// retried once with that invoice id.
    ///
    /// # Errors
    ///
    /// [`DonationError::TransactionNotFound`] when neither lookup matches;
    /// gateway and storage errors otherwise.
    pub async fn handle_redirect_callback(
        &self,
        payment_id: &str,
    ) -> Result<ReconcileOutcome, DonationError> {
        if let Some(transaction) = self.ledger.find_transaction_by_gateway_ref(payment_id).await? {
            return self
                .reconcile(transaction, SignalSource::Callback, None, None)
                .await;
        }

        let status = match self
            .fetch_status(&GatewayReference::Payment(payment_id.to_string()))
            .await
        {
            Ok(status) => status,
            Err(DonationError::GatewayRejected(_)) => {
                return Err(DonationError::TransactionNotFound(payment_id.to_string()));
            }
            Err(err) => return Err(err),
        };
        let transaction = self
            .ledger
            .find_transaction_by_gateway_ref(&status.invoice_id)
            .await?
            .ok_or_else(|| DonationError::TransactionNotFound(payment_id.to_string()))?;
        tracing::debug!(
            payment_id,
            invoice_id = %status.invoice_id,
            transaction_id = %transaction.id,
            "callback resolved through gateway lookup"
        );
        self.reconcile(transaction, SignalSource::Callback, None, Some(status))
            .await
    }

    /// Reconciles on a gateway webhook. `event_type` is recorded as a hint
    /// only; the status is always re-read from the gateway.
    ///
    /// # Errors
    ///
    /// [`DonationError::TransactionNotFound`] for an unknown resource id;
    /// gateway and storage errors otherwise.
    pub async fn handle_webhook(
        &self,
        event_type: Option<&str>,
        resource_id: &str,
    ) -> Result<ReconcileOutcome, DonationError> {
        let transaction = self
            .ledger
            .find_transaction_by_gateway_ref(resource_id)
            .await?
            .ok_or_else(|| DonationError::TransactionNotFound(resource_id.to_string()))?;
        self.reconcile(
            transaction,
            SignalSource::Webhook,
            event_type.map(str::to_string),
            None,
        )
        .await
    }

    /// Refunds a completed donation and subtracts it from the cause total.
    ///
    /// Refunding an already refunded donation is a no-op.
    ///
    /// # Errors
    ///
    /// [`DonationError::DonationNotFound`], or
    /// [`DonationError::InvalidRequest`] if the donation is not completed.
    pub async fn refund(&self, donation_id: DonationId) -> Result<ReconcileOutcome, DonationError> {
        let donation = self
            .ledger
            .find_donation(donation_id)
            .await?
            .ok_or_else(|| DonationError::DonationNotFound(*donation_id.as_uuid()))?;
        let transaction = self
            .ledger
            .current_transaction(donation_id)
            .await?
            .ok_or_else(|| DonationError::TransactionNotFound(donation_id.to_string()))?;

        match transaction.payment_status {
            PaymentStatus::Refunded => {
                return Ok(ReconcileOutcome {
                    transaction,
                    donation,
                    result: ReconcileResult::Unchanged,
                    gateway_status: None,
                    awards: Vec::new(),
                });
            }
            PaymentStatus::Completed => {}
            other => {
                return Err(DonationError::InvalidRequest(format!(
                    "only completed donations can be refunded, donation is {other}"
                )));
            }
        }

        self.ledger
            .record_gateway_check(&NewGatewayCheck {
                transaction_id: transaction.id,
                source: SignalSource::Refund,
                hint: None,
                gateway_status: "Refunded".to_string(),
                mapped_status: PaymentStatus::Refunded,
                payload: serde_json::Value::Null,
            })
            .await?;

        self.apply(transaction, PaymentStatus::Refunded, SignalSource::Refund, None)
            .await
    }

    /// Runs the shared reconciliation steps for one resolved transaction.
    ///
    /// `prefetched` skips the gateway read when the caller already holds an
    /// authoritative status for this transaction's invoice.
    ///
    /// # Errors
    ///
    /// Gateway and storage errors. A conflicting report is not an error.
    pub async fn reconcile(
        &self,
        transaction: Transaction,
        source: SignalSource,
        hint: Option<String>,
        prefetched: Option<InvoiceStatus>,
    ) -> Result<ReconcileOutcome, DonationError> {
        let status = match prefetched {
            Some(status) => status,
            None => match gateway_reference(&transaction) {
                Some(reference) => self.fetch_status(&reference).await?,
                None => {
                    tracing::debug!(
                        transaction_id = %transaction.id,
                        "no gateway reference yet, nothing to reconcile"
                    );
                    return self.view(transaction.id, ReconcileResult::Unchanged, None).await;
                }
            },
        };

        let incoming = PaymentStatus::from_gateway(&status.status);
        self.ledger
            .record_gateway_check(&NewGatewayCheck {
                transaction_id: transaction.id,
                source,
                hint,
                gateway_status: status.status.clone(),
                mapped_status: incoming,
                payload: status.raw.clone(),
            })
            .await?;
        if let Some(payment_id) = status.payment_id.as_deref() {
            self.ledger
                .attach_payment_id(transaction.id, payment_id)
                .await?;
        }

        let current = transaction.payment_status;
        let gateway_status = Some(status.status);
        match current.decide(incoming) {
            StatusDecision::Unchanged => {
                self.view(transaction.id, ReconcileResult::Unchanged, gateway_status)
                    .await
            }
            StatusDecision::Conflict => {
                warn_conflict(transaction.id, current, incoming, source);
                self.view(
                    transaction.id,
                    ReconcileResult::Conflict {
                        current,
                        reported: incoming,
                    },
                    gateway_status,
                )
                .await
            }
            StatusDecision::Advance(to) => self.apply(transaction, to, source, gateway_status).await,
            StatusDecision::Refund => {
                self.apply(transaction, PaymentStatus::Refunded, source, gateway_status)
                    .await
            }
        }
    }

    async fn apply(
        &self,
        transaction: Transaction,
        to: PaymentStatus,
        source: SignalSource,
        gateway_status: Option<String>,
    ) -> Result<ReconcileOutcome, DonationError> {
        let outcome = self
            .ledger
            .apply_terminal_transition(transaction.id, to.predecessors(), to)
            .await?;

        if !outcome.was_applied {
            // Another signal moved the row after our snapshot was read.
            let mut view = self
                .view(transaction.id, ReconcileResult::Unchanged, gateway_status)
                .await?;
            let current = view.transaction.payment_status;
            if current == to {
                tracing::debug!(
                    transaction_id = %transaction.id,
                    %to,
                    source = source.as_str(),
                    "transition already applied by another signal"
                );
            } else {
                warn_conflict(transaction.id, current, to, source);
                view.result = ReconcileResult::Conflict {
                    current,
                    reported: to,
                };
            }
            return Ok(view);
        }

        tracing::info!(
            transaction_id = %transaction.id,
            from = %transaction.payment_status,
            %to,
            source = source.as_str(),
            cause_raised = ?outcome.cause_raised,
            "payment transition applied"
        );

        let mut view = self
            .view(transaction.id, ReconcileResult::Applied(to), gateway_status)
            .await?;
        view.awards = self.dispatch_side_effects(&view.donation, to, outcome).await;
        Ok(view)
    }

    /// Runs achievement evaluation and progress fan-out after a first
    /// transition. Failures are logged and never undo the transition.
    async fn dispatch_side_effects(
        &self,
        donation: &Donation,
        to: PaymentStatus,
        outcome: TransitionOutcome,
    ) -> Vec<AchievementAward> {
        if !outcome.donation_transitioned {
            return Vec::new();
        }
        let mut awards = Vec::new();
        match to {
            PaymentStatus::Completed => {
                match self
                    .achievements
                    .process_achievements_for_donation(donation)
                    .await
                {
                    Ok(new) => awards = new,
                    Err(err) => tracing::error!(
                        donation_id = %donation.id,
                        error = %err,
                        "achievement evaluation failed"
                    ),
                }
                let _ = self.progress.broadcast(donation.cause_id).await;
            }
            PaymentStatus::Refunded => {
                let _ = self.progress.broadcast(donation.cause_id).await;
            }
            _ => {}
        }
        awards
    }

    async fn fetch_status(
        &self,
        reference: &GatewayReference,
    ) -> Result<InvoiceStatus, DonationError> {
        let status = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.get_invoice_status(reference),
        )
        .await
        .map_err(|_| {
            GatewayError::Unavailable(format!(
                "status check for {reference} timed out after {} ms",
                self.gateway_timeout.as_millis()
            ))
        })??;
        Ok(status)
    }

    async fn resolve_any(&self, reference: &str) -> Result<Transaction, DonationError> {
        if let Ok(uuid) = reference.parse::<uuid::Uuid>() {
            if let Some(transaction) = self
                .ledger
                .find_transaction(TransactionId::from_uuid(uuid))
                .await?
            {
                return Ok(transaction);
            }
            if let Some(transaction) = self
                .ledger
                .current_transaction(DonationId::from_uuid(uuid))
                .await?
            {
                return Ok(transaction);
            }
        }
        self.ledger
            .find_transaction_by_gateway_ref(reference)
            .await?
            .ok_or_else(|| DonationError::TransactionNotFound(reference.to_string()))
    }

    async fn view(
        &self,
        transaction_id: TransactionId,
        result: ReconcileResult,
        gateway_status: Option<String>,
    ) -> Result<ReconcileOutcome, DonationError> {
        let transaction = self
            .ledger
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| DonationError::TransactionNotFound(transaction_id.to_string()))?;
        let donation = self
            .ledger
            .find_donation(transaction.donation_id)
            .await?
            .ok_or_else(|| DonationError::DonationNotFound(*transaction.donation_id.as_uuid()))?;
        Ok(ReconcileOutcome {
            transaction,
            donation,
            result,
            gateway_status,
            awards: Vec::new(),
        })
    }
}

fn gateway_reference(transaction: &Transaction) -> Option<GatewayReference> {
    transaction
        .gateway_reference
        .clone()
        .map(GatewayReference::Invoice)
        .or_else(|| {
            transaction
                .gateway_payment_id
                .clone()
                .map(GatewayReference::Payment)
        })
}

fn warn_conflict(
    transaction_id: TransactionId,
    current: PaymentStatus,
    reported: PaymentStatus,
    source: SignalSource,
) {
    tracing::warn!(
        %transaction_id,
        %current,
        %reported,
        source = source.as_str(),
        "{}",
        DonationError::ConflictingTerminalState { current, reported }
    );
}
