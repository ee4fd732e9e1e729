//! donation-ledger server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use donation_ledger::api;
use donation_ledger::app_state::AppState;
use donation_ledger::config::AppConfig;
use donation_ledger::gateway::MyFatoorahClient;
use donation_ledger::persistence::{AwardStore, LedgerStore, MemoryLedger, PostgresLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting donation-ledger");

    // Build gateway client
    let gateway = Arc::new(
        MyFatoorahClient::new(
            config.myfatoorah_base_url.clone(),
            config.myfatoorah_api_key.clone(),
            config.gateway_timeout(),
        )
        .context("failed to build MyFatoorah client")?,
    );
    if config.myfatoorah_api_key.is_empty() {
        tracing::warn!("MYFATOORAH_API_KEY is empty, gateway calls will be rejected");
    }

    // Build persistence layer
    let (ledger, awards): (Arc<dyn LedgerStore>, Arc<dyn AwardStore>) =
        if config.persistence_enabled {
            let pg = Arc::new(
                PostgresLedger::connect(&config)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            );
            tracing::info!("using PostgreSQL ledger");
            let awards: Arc<PostgresLedger> = Arc::clone(&pg);
            (pg, awards)
        } else {
            let memory = Arc::new(MemoryLedger::new());
            let cause = memory
                .insert_cause("General fund", Decimal::new(10_000, 0))
                .await;
            tracing::warn!(
                cause_id = %cause.id,
                "persistence disabled, using in-memory ledger with one seeded cause"
            );
            let awards: Arc<MemoryLedger> = Arc::clone(&memory);
            (memory, awards)
        };

    // Build application state and router
    let app_state = AppState::build(&config, ledger, awards, gateway);
    let app = api::build_app(
        app_state,
        std::time::Duration::from_secs(config.request_timeout_secs),
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
