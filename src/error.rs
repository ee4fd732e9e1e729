//! Service error types with HTTP status code mapping.
//!
//! [`DonationError`] is the central error type. Each variant maps to a
//! specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::PaymentStatus;
use crate::gateway::GatewayError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2003,
///     "message": "transaction not found for gateway reference: 5123344"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server/Upstream | 500 / 503                    |
/// | 4000–4999 | Gateway         | 422 Unprocessable Entity     |
#[derive(Debug, thiserror::Error)]
pub enum DonationError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Cause with the given ID was not found.
    #[error("cause not found: {0}")]
    CauseNotFound(uuid::Uuid),

    /// Donation with the given ID was not found.
    #[error("donation not found: {0}")]
    DonationNotFound(uuid::Uuid),

    /// No local transaction matches the gateway reference.
    #[error("transaction not found for gateway reference: {0}")]
    TransactionNotFound(String),

    /// An incoming status contradicts a terminal state; the existing state
    /// was kept.
    #[error("transaction already {current}, gateway reported {reported}")]
    ConflictingTerminalState {
        /// Status that was kept.
        current: PaymentStatus,
        /// Status the signal reported.
        reported: PaymentStatus,
    },

    /// The gateway refused the request; retrying will not help.
    #[error("gateway rejected request: {0}")]
    GatewayRejected(String),

    /// The gateway could not be reached or timed out; the caller may retry.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceFailure(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DonationError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::CauseNotFound(_) => 2001,
            Self::DonationNotFound(_) => 2002,
            Self::TransactionNotFound(_) => 2003,
            Self::ConflictingTerminalState { .. } => 2004,
            Self::Internal(_) => 3000,
            Self::PersistenceFailure(_) => 3001,
            Self::GatewayUnavailable(_) => 3002,
            Self::GatewayRejected(_) => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::CauseNotFound(_) | Self::DonationNotFound(_) | Self::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::ConflictingTerminalState { .. } => StatusCode::CONFLICT,
            Self::GatewayRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the triggering signal should be redelivered later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_) | Self::PersistenceFailure(_)
        )
    }

    /// Short machine-readable code used in failure redirects.
    #[must_use]
    pub const fn redirect_code(&self) -> &'static str {
        match self {
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::GatewayRejected(_) => "gateway_rejected",
            Self::InvalidRequest(_) => "invalid_request",
            _ => "internal_error",
        }
    }
}

impl From<GatewayError> for DonationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => Self::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => Self::GatewayRejected(msg),
        }
    }
}

/// Maps a database error into [`DonationError::PersistenceFailure`].
pub(crate) fn persistence(err: sqlx::Error) -> DonationError {
    DonationError::PersistenceFailure(err.to_string())
}

impl IntoResponse for DonationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
