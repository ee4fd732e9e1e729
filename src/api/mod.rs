//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All endpoints are mounted under `/api/v1` except `/health`.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "donation-ledger",
        description = "Donation intake, gateway reconciliation, and cause progress."
    ),
    paths(
        handlers::donation::create_donation,
        handlers::donation::get_donation,
        handlers::donation::refund_donation,
        handlers::payment::verify_payment,
        handlers::payment::payment_callback,
        handlers::payment::payment_webhook,
        handlers::payment::payment_methods,
        handlers::cause::cause_progress,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::CreateDonationRequest,
        dto::CreateDonationResponse,
        dto::DonationDetailResponse,
        dto::DonationDto,
        dto::TransactionDto,
        dto::GiftDto,
        dto::DonorDto,
        dto::CauseProgressDto,
        dto::ReconcileResponse,
        dto::WebhookPayload,
        dto::WebhookAck,
        dto::PaymentMethodDto,
        handlers::system::HealthResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Donations", description = "Donation intake and refunds"),
        (name = "Payments", description = "Gateway signals and payment methods"),
        (name = "Causes", description = "Cause progress"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST routes, `/ws`, optional Swagger UI,
/// and the tracing, CORS and timeout middleware.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
