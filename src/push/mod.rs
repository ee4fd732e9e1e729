//! Outbound progress publishing.
//!
//! A [`ProgressPublisher`] delivers a cause progress snapshot to a named
//! channel. Two implementations exist: [`CentrifugoPublisher`] for the
//! Centrifugo HTTP API and [`EventBusPublisher`] feeding the in-process
//! [`crate::domain::EventBus`] behind `/ws`.

pub mod centrifugo;
pub mod local;

use std::fmt;

use async_trait::async_trait;

use crate::domain::CauseProgress;

pub use centrifugo::CentrifugoPublisher;
pub use local::EventBusPublisher;

/// Failure to deliver a progress update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The push service could not be reached or answered with an error.
    #[error("push transport error: {0}")]
    Transport(String),

    /// The publish did not finish within its time bound.
    #[error("publish timed out after {0} ms")]
    Timeout(u64),
}

/// Sink for cause progress updates.
#[async_trait]
pub trait ProgressPublisher: Send + Sync + fmt::Debug {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Publishes `progress` on `channel`.
    ///
    /// # Errors
    ///
    /// [`PublishError`] when the update could not be delivered.
    async fn publish(&self, channel: &str, progress: &CauseProgress) -> Result<(), PublishError>;
}
