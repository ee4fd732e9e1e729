//! Domain layer: ledger aggregates, status lattice, achievements, and the
//! live progress event bus.
//!
//! Nothing in this module touches the network or the database; the
//! persistence and gateway layers translate to and from these types.

pub mod achievement;
pub mod donation;
pub mod event_bus;
pub mod ids;
pub mod payment_status;
pub mod progress_event;

pub use achievement::{AchievementAward, AchievementRules, AchievementType, CompletedDonation};
pub use donation::{
    Cause, CauseProgress, Donation, GatewayCheck, GiftDetails, NewDonation, NewGatewayCheck,
    SignalSource, Transaction, TransitionOutcome,
};
pub use event_bus::EventBus;
pub use ids::{CauseId, DonationId, TransactionId, UserId};
pub use payment_status::{PaymentStatus, StatusDecision};
pub use progress_event::{ProgressEvent, cause_channel};
