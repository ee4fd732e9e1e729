//! Cause progress fan-out.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{CauseId, CauseProgress, cause_channel};
use crate::persistence::LedgerStore;
use crate::push::{ProgressPublisher, PublishError};

/// Reads a cause's progress and pushes it to every configured publisher.
///
/// Best effort: each publish is bounded by the timeout and failures are
/// logged, never returned.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    ledger: Arc<dyn LedgerStore>,
    publishers: Vec<Arc<dyn ProgressPublisher>>,
    timeout: Duration,
}

impl ProgressBroadcaster {
    /// Creates a broadcaster.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        publishers: Vec<Arc<dyn ProgressPublisher>>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            publishers,
            timeout,
        }
    }

    /// Publishes the cause's current progress on `causes:{cause_id}`.
    ///
    /// Returns the snapshot that was sent, or `None` when the cause could
    /// not be read.
    pub async fn broadcast(&self, cause_id: CauseId) -> Option<CauseProgress> {
        let progress = match self.ledger.cause_progress(cause_id).await {
            Ok(Some(progress)) => progress,
            Ok(None) => {
                tracing::warn!(%cause_id, "progress broadcast skipped: cause not found");
                return None;
            }
            Err(err) => {
                tracing::warn!(%cause_id, error = %err, "progress broadcast skipped");
                return None;
            }
        };

        let channel = cause_channel(cause_id);
        for publisher in &self.publishers {
            let result = tokio::time::timeout(self.timeout, publisher.publish(&channel, &progress))
                .await
                .unwrap_or_else(|_| {
                    Err(PublishError::Timeout(
                        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    ))
                });
            if let Err(err) = result {
                tracing::warn!(
                    publisher = publisher.name(),
                    %channel,
                    error = %err,
                    "progress publish failed"
                );
            }
        }
        Some(progress)
    }
}
