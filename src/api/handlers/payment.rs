//! Payment signal endpoints: verify, browser callback, webhook, methods.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CallbackQuery, PaymentMethodDto, PaymentMethodsQuery, ReconcileResponse, WebhookAck,
    WebhookPayload,
};
use crate::app_state::AppState;
use crate::domain::PaymentStatus;
use crate::error::{DonationError, ErrorResponse};

/// `GET /payments/verify/{id}` — Reconcile one transaction now.
///
/// # Errors
///
/// Returns [`DonationError`] when nothing matches the reference or the
/// gateway cannot be reached.
#[utoipa::path(
    get,
    path = "/api/v1/payments/verify/{id}",
    tag = "Payments",
    summary = "Verify a payment",
    description = "Accepts a transaction id, donation id, gateway invoice id or gateway payment id, re-reads the status from the gateway and applies it.",
    params(
        ("id" = String, Path, description = "Local or gateway reference"),
    ),
    responses(
        (status = 200, description = "Reconciled view", body = ReconcileResponse),
        (status = 404, description = "No matching transaction", body = ErrorResponse),
        (status = 503, description = "Gateway unavailable", body = ErrorResponse),
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, DonationError> {
    let outcome = state.reconciliation.handle_verify(id.trim()).await?;
    Ok(Json(ReconcileResponse::from(outcome)))
}

/// `GET /payments/callback` — Browser redirect back from the gateway.
///
/// Always answers with a `303 See Other` to the success or failure page.
#[utoipa::path(
    get,
    path = "/api/v1/payments/callback",
    tag = "Payments",
    summary = "Gateway redirect callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the success or failure page"),
    )
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let Some(payment_id) = query.reference() else {
        return Redirect::to(&with_query(
            &state.failure_redirect_url,
            &[("error", "missing_payment_id")],
        ));
    };

    match state.reconciliation.handle_redirect_callback(payment_id).await {
        Ok(outcome) => {
            let donation_id = outcome.donation.id.to_string();
            match outcome.donation.payment_status {
                PaymentStatus::Failed | PaymentStatus::Refunded => Redirect::to(&with_query(
                    &state.failure_redirect_url,
                    &[("error", "payment_failed"), ("donation_id", donation_id.as_str())],
                )),
                status => Redirect::to(&with_query(
                    &state.success_redirect_url,
                    &[("donation_id", donation_id.as_str()), ("status", status.as_str())],
                )),
            }
        }
        Err(err) => {
            tracing::warn!(payment_id, error = %err, "payment callback failed");
            Redirect::to(&with_query(
                &state.failure_redirect_url,
                &[("error", err.redirect_code())],
            ))
        }
    }
}

/// `POST /payments/webhook` — Gateway server-to-server notification.
///
/// Unknown, missing or malformed resources are acknowledged with
/// `success: false` and HTTP 200 so the gateway stops redelivering.
/// Transient failures return 5xx so it redelivers later.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "Payments",
    summary = "Gateway webhook",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Acknowledged", body = WebhookAck),
        (status = 500, description = "Storage failure, redeliver", body = ErrorResponse),
        (status = 503, description = "Gateway unavailable, redeliver", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "malformed webhook body");
            return ack(false, "malformed body");
        }
    };
    let Some(resource_id) = payload
        .resource_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        tracing::warn!(event_type = ?payload.event_type, "webhook without ResourceId");
        return ack(false, "missing ResourceId");
    };

    match state
        .reconciliation
        .handle_webhook(payload.event_type.as_deref(), resource_id)
        .await
    {
        Ok(outcome) => {
            let message = format!(
                "transaction {} is {}",
                outcome.transaction.id, outcome.transaction.payment_status
            );
            ack(true, &message)
        }
        Err(err) if err.is_retryable() || matches!(err, DonationError::Internal(_)) => {
            err.into_response()
        }
        Err(err) => {
            tracing::warn!(resource_id, error = %err, "webhook not processed");
            ack(false, &err.to_string())
        }
    }
}

/// `GET /payment-methods` — Methods the gateway offers for an amount.
///
/// # Errors
///
/// Returns [`DonationError`] on invalid input or gateway failure.
#[utoipa::path(
    get,
    path = "/api/v1/payment-methods",
    tag = "Payments",
    summary = "List payment methods",
    params(PaymentMethodsQuery),
    responses(
        (status = 200, description = "Available methods", body = Vec<PaymentMethodDto>),
        (status = 400, description = "Invalid amount or currency", body = ErrorResponse),
        (status = 503, description = "Gateway unavailable", body = ErrorResponse),
    )
)]
pub async fn payment_methods(
    State(state): State<AppState>,
    Query(query): Query<PaymentMethodsQuery>,
) -> Result<impl IntoResponse, DonationError> {
    let methods = state
        .donations
        .payment_methods(query.amount, query.currency.as_deref())
        .await?;
    let dto: Vec<PaymentMethodDto> = methods.into_iter().map(Into::into).collect();
    Ok(Json(dto))
}

fn ack(success: bool, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(WebhookAck {
            success,
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Appends query pairs to `base`. Values are expected to be URL-safe.
fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/verify/{id}", get(verify_payment))
        .route("/payments/callback", get(payment_callback))
        .route("/payments/webhook", post(payment_webhook))
        .route("/payment-methods", get(payment_methods))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_appended_with_the_right_separator() {
        assert_eq!(
            with_query("https://site/ok", &[("donation_id", "abc")]),
            "https://site/ok?donation_id=abc"
        );
        assert_eq!(
            with_query("https://site/ok?lang=ar", &[("a", "1"), ("b", "2")]),
            "https://site/ok?lang=ar&a=1&b=2"
        );
    }
}
