//! Live progress events delivered to in-process subscribers.
//!
//! Every successful change to a cause's raised amount produces a
//! [`ProgressEvent`] on the [`super::EventBus`]; WebSocket connections
//! forward the ones matching their subscriptions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CauseId, CauseProgress};

/// A published progress update for one cause channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Channel name the update was published to (e.g. `causes:<id>`).
    pub channel: String,
    /// Progress snapshot.
    pub progress: CauseProgress,
    /// Publication timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(channel: impl Into<String>, progress: CauseProgress) -> Self {
        Self {
            channel: channel.into(),
            progress,
            timestamp: Utc::now(),
        }
    }

    /// Returns the cause this event describes.
    #[must_use]
    pub const fn cause_id(&self) -> CauseId {
        self.progress.cause_id
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        "cause_progress"
    }
}

/// Channel name for a cause's progress updates.
#[must_use]
pub fn cause_channel(cause_id: CauseId) -> String {
    format!("causes:{cause_id}")
}
