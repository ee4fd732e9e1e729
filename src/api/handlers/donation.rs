//! Donation endpoints: create, get, refund.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CreateDonationRequest, CreateDonationResponse, DonationDetailResponse, ReconcileResponse,
};
use crate::app_state::AppState;
use crate::domain::{CauseId, DonationId, UserId};
use crate::error::{DonationError, ErrorResponse};
use crate::gateway::{CustomerInfo, MethodSelector};
use crate::service::DonationRequest;

/// `POST /donations` — Create a donation and open its gateway invoice.
///
/// # Errors
///
/// Returns [`DonationError`] on invalid input, unknown cause, or gateway
/// failure.
#[utoipa::path(
    post,
    path = "/api/v1/donations",
    tag = "Donations",
    summary = "Create a donation",
    description = "Records the donation and its first transaction, opens a gateway invoice for amount plus any covered fee, and returns the payment URL.",
    request_body = CreateDonationRequest,
    responses(
        (status = 201, description = "Donation created, invoice opened", body = CreateDonationResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Cause not found", body = ErrorResponse),
        (status = 422, description = "Gateway rejected the invoice", body = ErrorResponse),
        (status = 503, description = "Gateway unavailable", body = ErrorResponse),
    )
)]
pub async fn create_donation(
    State(state): State<AppState>,
    Json(req): Json<CreateDonationRequest>,
) -> Result<impl IntoResponse, DonationError> {
    let request = to_service_request(req);
    let created = state.donations.create_donation(request).await?;

    let response = CreateDonationResponse {
        donation: created.donation.into(),
        transaction: created.transaction.into(),
        payment_url: created.payment_url,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /donations/{id}` — Donation with its current transaction.
///
/// # Errors
///
/// Returns [`DonationError::DonationNotFound`] for an unknown id.
#[utoipa::path(
    get,
    path = "/api/v1/donations/{id}",
    tag = "Donations",
    summary = "Get a donation",
    params(
        ("id" = uuid::Uuid, Path, description = "Donation UUID"),
    ),
    responses(
        (status = 200, description = "Donation detail", body = DonationDetailResponse),
        (status = 404, description = "Donation not found", body = ErrorResponse),
    )
)]
pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, DonationError> {
    let (donation, transaction) = state
        .donations
        .donation_with_transaction(DonationId::from_uuid(id))
        .await?;
    Ok(Json(DonationDetailResponse {
        donation: donation.into(),
        transaction: transaction.map(Into::into),
    }))
}

/// `POST /donations/{id}/refund` — Refund a completed donation.
///
/// # Errors
///
/// Returns [`DonationError`] when the donation is missing or not completed.
#[utoipa::path(
    post,
    path = "/api/v1/donations/{id}/refund",
    tag = "Donations",
    summary = "Refund a donation",
    description = "Moves a completed donation to refunded and subtracts it from the cause total. Refunding twice is a no-op.",
    params(
        ("id" = uuid::Uuid, Path, description = "Donation UUID"),
    ),
    responses(
        (status = 200, description = "Refund applied or already applied", body = ReconcileResponse),
        (status = 400, description = "Donation is not completed", body = ErrorResponse),
        (status = 404, description = "Donation not found", body = ErrorResponse),
    )
)]
pub async fn refund_donation(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, DonationError> {
    let outcome = state
        .reconciliation
        .refund(DonationId::from_uuid(id))
        .await?;
    Ok(Json(ReconcileResponse::from(outcome)))
}

fn to_service_request(req: CreateDonationRequest) -> DonationRequest {
    let name = req
        .donor
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            if req.is_anonymous {
                "Anonymous".to_string()
            } else {
                "Donor".to_string()
            }
        });
    DonationRequest {
        cause_id: CauseId::from_uuid(req.cause_id),
        user_id: req.user_id.map(UserId::from_uuid),
        amount: req.amount,
        currency: req.currency,
        cover_fee: req.cover_fee,
        is_anonymous: req.is_anonymous,
        gift: req.gift.map(Into::into),
        customer: CustomerInfo {
            name,
            email: req.donor.email,
            mobile: req.donor.mobile,
        },
        method: req
            .payment_method_id
            .map_or(MethodSelector::Link, MethodSelector::Method),
    }
}

/// Donation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/donations", post(create_donation))
        .route("/donations/{id}", get(get_donation))
        .route("/donations/{id}/refund", post(refund_donation))
}
