//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::EventBus;
use crate::gateway::PaymentGateway;
use crate::persistence::{AwardStore, LedgerStore};
use crate::push::{CentrifugoPublisher, EventBusPublisher, ProgressPublisher};
use crate::service::{
    AchievementEvaluator, DonationService, IntakeSettings, ProgressBroadcaster,
    ReconciliationEngine,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Donation intake and queries.
    pub donations: Arc<DonationService>,
    /// Inbound payment signal reconciliation.
    pub reconciliation: Arc<ReconciliationEngine>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Front-end page the callback redirects to on success.
    pub success_redirect_url: String,
    /// Front-end page the callback redirects to on failure.
    pub failure_redirect_url: String,
}

impl AppState {
    /// Wires services over the given stores and gateway.
    ///
    /// Progress always goes to the local event bus, and to Centrifugo as
    /// well when `config.centrifugo_api_url` is set.
    #[must_use]
    pub fn build(
        config: &AppConfig,
        ledger: Arc<dyn LedgerStore>,
        awards: Arc<dyn AwardStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);

        let mut publishers: Vec<Arc<dyn ProgressPublisher>> =
            vec![Arc::new(EventBusPublisher::new(event_bus.clone()))];
        if let Some(url) = config.centrifugo_api_url.as_deref() {
            let key = config.centrifugo_api_key.clone().unwrap_or_default();
            match CentrifugoPublisher::new(url, key, config.publish_timeout()) {
                Ok(publisher) => publishers.push(Arc::new(publisher)),
                Err(err) => tracing::error!(error = %err, "centrifugo publisher disabled"),
            }
        }

        let progress = ProgressBroadcaster::new(
            Arc::clone(&ledger),
            publishers,
            config.publish_timeout(),
        );
        let achievements = AchievementEvaluator::new(awards, config.achievement_rules());
        let reconciliation = ReconciliationEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&gateway),
            achievements,
            progress,
            config.gateway_timeout(),
        );
        let donations = DonationService::new(
            ledger,
            gateway,
            IntakeSettings {
                default_currency: config.default_currency.clone(),
                processing_fee_percent: config.processing_fee_percent,
                callback_url: config.payment_callback_url.clone(),
                error_url: config.payment_error_url.clone(),
                invoice_max_attempts: config.invoice_max_attempts,
                invoice_retry_base: Duration::from_millis(config.invoice_retry_base_ms),
                gateway_timeout: config.gateway_timeout(),
            },
        );

        Self {
            donations: Arc::new(donations),
            reconciliation: Arc::new(reconciliation),
            event_bus,
            success_redirect_url: config.success_redirect_url.clone(),
            failure_redirect_url: config.failure_redirect_url.clone(),
        }
    }
}
