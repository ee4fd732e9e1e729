//! Payment status lattice shared by donations and transactions.
//!
//! Statuses only move forward:
//!
//! ```text
//! pending → processing → initiated → { completed | failed }
//!                                       completed → refunded
//! ```
//!
//! `completed → refunded` is the single backward-compatible move (a
//! chargeback). Everything else that would leave a terminal state is a
//! conflict and keeps the current state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a donation or one of its gateway transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Recorded, no gateway interaction yet.
    Pending,
    /// Local records exist; invoice creation in flight.
    Processing,
    /// The gateway accepted the invoice and the payer was redirected.
    Initiated,
    /// Funds received.
    Completed,
    /// The gateway reported a failure, decline, cancellation or expiry.
    Failed,
    /// Funds returned after completion.
    Refunded,
}

impl PaymentStatus {
    /// All statuses in lattice order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Initiated,
        Self::Completed,
        Self::Failed,
        Self::Refunded,
    ];

    /// Statuses from which a completion or failure may still be applied.
    pub const OPEN: [Self; 3] = [Self::Pending, Self::Processing, Self::Initiated];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Initiated => "initiated",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Returns `true` for `completed`, `failed` and `refunded`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Refunded)
    }

    /// Statuses a conditional update into `self` may start from.
    #[must_use]
    pub const fn predecessors(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Initiated => &[Self::Pending, Self::Processing],
            Self::Completed | Self::Failed => &Self::OPEN,
            Self::Refunded => &[Self::Completed],
        }
    }

    /// Maps the gateway's status vocabulary onto the internal lattice.
    ///
    /// Unknown strings map to [`PaymentStatus::Processing`], which never
    /// regresses a terminal state (see [`PaymentStatus::decide`]).
    #[must_use]
    pub fn from_gateway(status: &str) -> Self {
        let s = status.trim();
        if s.eq_ignore_ascii_case("paid") {
            Self::Completed
        } else if ["failed", "expired", "declined", "canceled", "cancelled"]
            .iter()
            .any(|f| s.eq_ignore_ascii_case(f))
        {
            Self::Failed
        } else if s.eq_ignore_ascii_case("refunded") {
            Self::Refunded
        } else {
            Self::Processing
        }
    }

    /// Decides what an incoming (already mapped) status does to `self`.
    #[must_use]
    pub fn decide(self, incoming: Self) -> StatusDecision {
        if self == incoming {
            return StatusDecision::Unchanged;
        }
        match (self, incoming) {
            (Self::Completed, Self::Refunded) => StatusDecision::Refund,
            (current, _) if current.is_terminal() => StatusDecision::Conflict,
            (_, Self::Completed | Self::Failed) => StatusDecision::Advance(incoming),
            // A refund report for something never completed, or a
            // non-terminal report: nothing to move.
            _ => StatusDecision::Unchanged,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Outcome of comparing a current status with an incoming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    /// Nothing to write; no side effects.
    Unchanged,
    /// Move from an open status into the given terminal status.
    Advance(PaymentStatus),
    /// Move `completed → refunded`.
    Refund,
    /// The incoming status contradicts a terminal state; keep the current one.
    Conflict,
}
