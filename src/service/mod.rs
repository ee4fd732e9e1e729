//! Service layer: business logic orchestration.
//!
//! [`DonationService`] handles intake and read-side queries.
//! [`ReconciliationEngine`] turns verify, callback and webhook signals into
//! idempotent ledger transitions and gates the side effects dispatched by
//! [`AchievementEvaluator`] and [`ProgressBroadcaster`].

pub mod achievements;
pub mod donation_service;
pub mod progress;
pub mod reconciliation;

pub use achievements::AchievementEvaluator;
pub use donation_service::{CreatedDonation, DonationRequest, DonationService, IntakeSettings};
pub use progress::ProgressBroadcaster;
pub use reconciliation::{ReconcileOutcome, ReconcileResult, ReconciliationEngine};
