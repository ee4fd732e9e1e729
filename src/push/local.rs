//! Publisher feeding the in-process event bus.

use async_trait::async_trait;

use super::{ProgressPublisher, PublishError};
use crate::domain::{CauseProgress, EventBus, ProgressEvent};

/// Forwards updates to every WebSocket subscriber through the [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventBusPublisher {
    bus: EventBus,
}

impl EventBusPublisher {
    /// Wraps an event bus.
    #[must_use]
    pub const fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ProgressPublisher for EventBusPublisher {
    fn name(&self) -> &'static str {
        "event_bus"
    }

    async fn publish(&self, channel: &str, progress: &CauseProgress) -> Result<(), PublishError> {
        let receivers = self
            .bus
            .publish(ProgressEvent::new(channel, progress.clone()));
        tracing::debug!(channel, receivers, "progress published to event bus");
        Ok(())
    }
}
