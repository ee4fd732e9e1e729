//! Donation intake: validation, ledger insert, and invoice creation.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::{
    CauseId, CauseProgress, Donation, DonationId, GiftDetails, NewDonation, PaymentStatus,
    Transaction, UserId,
};
use crate::error::DonationError;
use crate::gateway::{
    CreatedInvoice, CustomerInfo, GatewayError, InvoiceRequest, MethodSelector, PaymentGateway,
    PaymentMethod,
};
use crate::persistence::LedgerStore;

/// Settings for donation intake.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// Currency used when a request carries none.
    pub default_currency: String,
    /// Fee percentage a donor may choose to cover.
    pub processing_fee_percent: Decimal,
    /// Gateway redirect target after success.
    pub callback_url: String,
    /// Gateway redirect target after failure.
    pub error_url: String,
    /// Attempts for invoice creation while the gateway is unavailable.
    pub invoice_max_attempts: u32,
    /// First backoff delay; doubled on each further attempt.
    pub invoice_retry_base: Duration,
    /// Upper bound for one gateway call.
    pub gateway_timeout: Duration,
}

/// A donation request as accepted from the API.
#[derive(Debug, Clone)]
pub struct DonationRequest {
    /// Cause to donate to.
    pub cause_id: CauseId,
    /// Donating user, if signed in.
    pub user_id: Option<UserId>,
    /// Amount credited to the cause.
    pub amount: Decimal,
    /// Currency; the configured default when `None`.
    pub currency: Option<String>,
    /// Add the processing fee on top of the amount.
    pub cover_fee: bool,
    /// Hide the donor in public listings.
    pub is_anonymous: bool,
    /// Gift dedication.
    pub gift: Option<GiftDetails>,
    /// Payer details for the invoice.
    pub customer: CustomerInfo,
    /// Payment method selection.
    pub method: MethodSelector,
}

/// A donation whose invoice is open at the gateway.
#[derive(Debug, Clone)]
pub struct CreatedDonation {
    /// The stored donation, `initiated`.
    pub donation: Donation,
    /// Its transaction, carrying the invoice id.
    pub transaction: Transaction,
    /// Where to send the payer.
    pub payment_url: String,
}

/// Donation intake and read-side queries.
#[derive(Debug, Clone)]
pub struct DonationService {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: IntakeSettings,
}

impl DonationService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            ledger,
            gateway,
            settings,
        }
    }

    /// Validates the request, records the donation and its transaction,
    /// and opens a gateway invoice for `amount + covered_fee`.
    ///
    /// Invoice creation is retried with exponential backoff while the
    /// gateway is unavailable. If it ultimately fails the transaction and
    /// donation are marked `failed` and the gateway error is returned.
    ///
    /// # Errors
    ///
    /// [`DonationError::InvalidRequest`], [`DonationError::CauseNotFound`],
    /// [`DonationError::GatewayRejected`] or
    /// [`DonationError::GatewayUnavailable`].
    pub async fn create_donation(
        &self,
        request: DonationRequest,
    ) -> Result<CreatedDonation, DonationError> {
        let new = self.validate(&request)?;
        if self.ledger.find_cause(new.cause_id).await?.is_none() {
            return Err(DonationError::CauseNotFound(*new.cause_id.as_uuid()));
        }

        let (donation, transaction) = self.ledger.insert_donation(&new).await?;
        tracing::info!(
            donation_id = %donation.id,
            transaction_id = %transaction.id,
            cause_id = %donation.cause_id,
            total = %donation.total_amount,
            currency = %donation.currency,
            "donation recorded"
        );

        let invoice_request = InvoiceRequest {
            amount: donation.total_amount,
            currency: donation.currency.clone(),
            customer: request.customer,
            callback_url: self.settings.callback_url.clone(),
            error_url: self.settings.error_url.clone(),
            customer_reference: transaction.id.to_string(),
            method: request.method,
        };

        let invoice = match self.open_invoice(&invoice_request).await {
            Ok(invoice) => invoice,
            Err(err) => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "invoice creation failed, marking transaction failed"
                );
                self.ledger
                    .apply_terminal_transition(
                        transaction.id,
                        &PaymentStatus::OPEN,
                        PaymentStatus::Failed,
                    )
                    .await?;
                return Err(err.into());
            }
        };

        self.ledger
            .attach_invoice(transaction.id, &invoice.invoice_id)
            .await?;
        tracing::info!(
            transaction_id = %transaction.id,
            invoice_id = %invoice.invoice_id,
            "invoice opened"
        );

        let (donation, transaction) = self.donation_with_transaction(donation.id).await?;
        let transaction =
            transaction.ok_or_else(|| DonationError::TransactionNotFound(invoice.invoice_id))?;
        Ok(CreatedDonation {
            donation,
            transaction,
            payment_url: invoice.payment_url,
        })
    }

    /// Loads a donation and its current transaction.
    ///
    /// # Errors
    ///
    /// [`DonationError::DonationNotFound`] or a storage failure.
    pub async fn donation_with_transaction(
        &self,
        donation_id: DonationId,
    ) -> Result<(Donation, Option<Transaction>), DonationError> {
        let donation = self
            .ledger
            .find_donation(donation_id)
            .await?
            .ok_or_else(|| DonationError::DonationNotFound(*donation_id.as_uuid()))?;
        let transaction = self.ledger.current_transaction(donation_id).await?;
        Ok((donation, transaction))
    }

    /// Current progress of a cause.
    ///
    /// # Errors
    ///
    /// [`DonationError::CauseNotFound`] or a storage failure.
    pub async fn cause_progress(&self, cause_id: CauseId) -> Result<CauseProgress, DonationError> {
        self.ledger
            .cause_progress(cause_id)
            .await?
            .ok_or_else(|| DonationError::CauseNotFound(*cause_id.as_uuid()))
    }

    /// Payment methods the gateway offers for an amount.
    ///
    /// # Errors
    ///
    /// [`DonationError::InvalidRequest`] for a non-positive amount; gateway
    /// errors otherwise.
    pub async fn payment_methods(
        &self,
        amount: Decimal,
        currency: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, DonationError> {
        if amount <= Decimal::ZERO {
            return Err(DonationError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        let currency = normalize_currency(currency.unwrap_or(&self.settings.default_currency))?;
        let methods = tokio::time::timeout(
            self.settings.gateway_timeout,
            self.gateway.list_payment_methods(amount, &currency),
        )
        .await
        .map_err(|_| GatewayError::Unavailable("payment method lookup timed out".to_string()))??;
        Ok(methods)
    }

    fn validate(&self, request: &DonationRequest) -> Result<NewDonation, DonationError> {
        if request.amount <= Decimal::ZERO {
            return Err(DonationError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        if request.amount.scale() > 3 {
            return Err(DonationError::InvalidRequest(
                "amount has more than three decimal places".to_string(),
            ));
        }
        let currency = normalize_currency(
            request
                .currency
                .as_deref()
                .unwrap_or(&self.settings.default_currency),
        )?;
        if let Some(gift) = &request.gift {
            if gift.recipient_name.trim().is_empty() {
                return Err(DonationError::InvalidRequest(
                    "gift recipient name is required".to_string(),
                ));
            }
            if !gift.recipient_email.contains('@') {
                return Err(DonationError::InvalidRequest(
                    "gift recipient email is invalid".to_string(),
                ));
            }
        }
        if request.customer.name.trim().is_empty() {
            return Err(DonationError::InvalidRequest(
                "customer name is required".to_string(),
            ));
        }

        let covered_fee = if request.cover_fee {
            processing_fee(request.amount, self.settings.processing_fee_percent)
        } else {
            Decimal::ZERO
        };

        Ok(NewDonation {
            cause_id: request.cause_id,
            user_id: request.user_id,
            amount: request.amount,
            covered_fee,
            currency,
            is_anonymous: request.is_anonymous,
            gift: request.gift.clone(),
            payment_method: request.method.label(),
        })
    }

    async fn open_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice, GatewayError> {
        let attempts = self.settings.invoice_max_attempts.max(1);
        let mut delay = self.settings.invoice_retry_base;
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(
                self.settings.gateway_timeout,
                self.gateway.create_invoice(request),
            )
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Unavailable(
                    "invoice creation timed out".to_string(),
                ))
            });
            match result {
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        reference = %request.customer_reference,
                        error = %err,
                        "gateway unavailable, retrying invoice creation"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Fee covered by the donor: `amount × percent / 100`, rounded to two places.
#[must_use]
pub fn processing_fee(amount: Decimal, percent: Decimal) -> Decimal {
    (amount * percent / Decimal::ONE_HUNDRED).round_dp(2)
}

fn normalize_currency(currency: &str) -> Result<String, DonationError> {
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DonationError::InvalidRequest(format!(
            "currency must be a three-letter ISO code, got {currency:?}"
        )));
    }
    Ok(currency.to_ascii_uppercase())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::gateway::{GatewayReference, InvoiceStatus};
    use crate::persistence::MemoryLedger;

    /// Fails the first `failures` creates with the given error.
    #[derive(Debug)]
    struct FlakyGateway {
        failures: u32,
        error: GatewayError,
        calls: AtomicU32,
        last: Mutex<Option<InvoiceRequest>>,
    }

    impl FlakyGateway {
        fn new(failures: u32, error: GatewayError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FlakyGateway {
        async fn create_invoice(
            &self,
            request: &InvoiceRequest,
        ) -> Result<CreatedInvoice, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last.lock() {
                *last = Some(request.clone());
            }
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(CreatedInvoice {
                invoice_id: format!("inv-{call}"),
                payment_url: format!("https://pay.example/inv-{call}"),
            })
        }

        async fn get_invoice_status(
            &self,
            _: &GatewayReference,
        ) -> Result<InvoiceStatus, GatewayError> {
            Err(GatewayError::Rejected("unused".to_string()))
        }

        async fn list_payment_methods(
            &self,
            _: Decimal,
            currency: &str,
        ) -> Result<Vec<PaymentMethod>, GatewayError> {
            Ok(vec![PaymentMethod {
                id: 1,
                name: "KNET".to_string(),
                code: Some("kn".to_string()),
                is_direct: false,
                service_charge: Decimal::ZERO,
                total_amount: Decimal::TEN,
                currency: Some(currency.to_string()),
                image_url: None,
            }])
        }
    }

    fn settings() -> IntakeSettings {
        IntakeSettings {
            default_currency: "KWD".to_string(),
            processing_fee_percent: Decimal::new(25, 1),
            callback_url: "http://localhost/callback".to_string(),
            error_url: "http://localhost/error".to_string(),
            invoice_max_attempts: 3,
            invoice_retry_base: Duration::from_millis(1),
            gateway_timeout: Duration::from_secs(1),
        }
    }

    fn request(cause_id: CauseId) -> DonationRequest {
        DonationRequest {
            cause_id,
            user_id: Some(UserId::new()),
            amount: Decimal::new(200, 0),
            currency: None,
            cover_fee: true,
            is_anonymous: false,
            gift: None,
            customer: CustomerInfo {
                name: "Noor".to_string(),
                email: Some("noor@example.com".to_string()),
                mobile: None,
            },
            method: MethodSelector::Link,
        }
    }

    async fn service(gateway: FlakyGateway) -> (DonationService, Arc<MemoryLedger>, Arc<FlakyGateway>, CauseId) {
        let ledger = Arc::new(MemoryLedger::new());
        let cause = ledger.insert_cause("Orphans", Decimal::new(10_000, 0)).await;
        let gateway = Arc::new(gateway);
        let store: Arc<MemoryLedger> = Arc::clone(&ledger);
        let gw: Arc<FlakyGateway> = Arc::clone(&gateway);
        (DonationService::new(store, gw, settings()), ledger, gateway, cause.id)
    }

    #[tokio::test]
    async fn creates_initiated_donation_with_covered_fee() {
        let (svc, _, gateway, cause_id) =
            service(FlakyGateway::new(0, GatewayError::Rejected(String::new()))).await;

        let Ok(created) = svc.create_donation(request(cause_id)).await else {
            panic!("create failed");
        };
        assert_eq!(created.donation.covered_fee, Decimal::new(500, 2));
        assert_eq!(created.donation.total_amount, Decimal::new(20500, 2));
        assert_eq!(created.donation.currency, "KWD");
        assert_eq!(created.donation.payment_status, PaymentStatus::Initiated);
        assert_eq!(created.transaction.gateway_reference.as_deref(), Some("inv-0"));
        assert_eq!(created.payment_url, "https://pay.example/inv-0");

        let Ok(last) = gateway.last.lock() else {
            panic!("lock poisoned");
        };
        let Some(sent) = last.as_ref() else {
            panic!("no invoice request");
        };
        assert_eq!(sent.amount, Decimal::new(20500, 2));
        assert_eq!(sent.customer_reference, created.transaction.id.to_string());
    }

    #[tokio::test]
    async fn retries_while_gateway_is_unavailable() {
        let (svc, _, gateway, cause_id) = service(FlakyGateway::new(
            2,
            GatewayError::Unavailable("503".to_string()),
        ))
        .await;
        let Ok(created) = svc.create_donation(request(cause_id)).await else {
            panic!("create failed");
        };
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
        assert_eq!(created.transaction.gateway_reference.as_deref(), Some("inv-2"));
    }

    #[tokio::test]
    async fn rejection_marks_transaction_failed() {
        let (svc, ledger, gateway, cause_id) = service(FlakyGateway::new(
            5,
            GatewayError::Rejected("invalid mobile".to_string()),
        ))
        .await;
        let result = svc.create_donation(request(cause_id)).await;
        assert!(matches!(result, Err(DonationError::GatewayRejected(_))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        let Ok(Some(progress)) = ledger.cause_progress(cause_id).await else {
            panic!("progress missing");
        };
        assert_eq!(progress.raised_amount, Decimal::ZERO);
        assert_eq!(progress.donor_count, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let (svc, _, gateway, cause_id) = service(FlakyGateway::new(
            10,
            GatewayError::Unavailable("timeout".to_string()),
        ))
        .await;
        let result = svc.create_donation(request(cause_id)).await;
        assert!(matches!(result, Err(DonationError::GatewayUnavailable(_))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_rejects_bad_input() {
        let (svc, _, gateway, cause_id) =
            service(FlakyGateway::new(0, GatewayError::Rejected(String::new()))).await;

        let mut zero = request(cause_id);
        zero.amount = Decimal::ZERO;
        assert!(matches!(
            svc.create_donation(zero).await,
            Err(DonationError::InvalidRequest(_))
        ));

        let mut currency = request(cause_id);
        currency.currency = Some("KW".to_string());
        assert!(matches!(
            svc.create_donation(currency).await,
            Err(DonationError::InvalidRequest(_))
        ));

        let mut gift = request(cause_id);
        gift.gift = Some(GiftDetails {
            recipient_name: "Ali".to_string(),
            recipient_email: "not-an-email".to_string(),
            message: None,
        });
        assert!(matches!(
            svc.create_donation(gift).await,
            Err(DonationError::InvalidRequest(_))
        ));

        let unknown = request(CauseId::new());
        assert!(matches!(
            svc.create_donation(unknown).await,
            Err(DonationError::CauseNotFound(_))
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lowercase_currency_is_normalized() {
        let (svc, _, _, cause_id) =
            service(FlakyGateway::new(0, GatewayError::Rejected(String::new()))).await;
        let mut req = request(cause_id);
        req.currency = Some("sar".to_string());
        req.cover_fee = false;
        let Ok(created) = svc.create_donation(req).await else {
            panic!("create failed");
        };
        assert_eq!(created.donation.currency, "SAR");
        assert_eq!(created.donation.covered_fee, Decimal::ZERO);
    }

    #[tokio::test]
    async fn payment_methods_use_default_currency() {
        let (svc, _, _, _) =
            service(FlakyGateway::new(0, GatewayError::Rejected(String::new()))).await;
        let Ok(methods) = svc.payment_methods(Decimal::TEN, None).await else {
            panic!("lookup failed");
        };
        assert_eq!(methods.len(), 1);
        assert!(methods.iter().all(|m| m.currency.as_deref() == Some("KWD")));
    }

    #[test]
    fn fee_rounds_to_two_places() {
        assert_eq!(
            processing_fee(Decimal::new(3333, 2), Decimal::new(25, 1)),
            Decimal::new(83, 2)
        );
    }
}
