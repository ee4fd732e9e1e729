//! Centrifugo HTTP API publisher.
//!
//! Each update is a `POST {api_url}/publish` with the `X-API-Key` header
//! and a `{"channel", "data"}` body.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{ProgressPublisher, PublishError};
use crate::domain::CauseProgress;

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    channel: &'a str,
    data: &'a CauseProgress,
}

/// Publishes progress through Centrifugo's server API.
#[derive(Debug, Clone)]
pub struct CentrifugoPublisher {
    http: reqwest::Client,
    publish_url: String,
    api_key: String,
}

impl CentrifugoPublisher {
    /// Builds a publisher for the given API URL and key.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        api_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            publish_url: format!("{}/publish", api_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ProgressPublisher for CentrifugoPublisher {
    fn name(&self) -> &'static str {
        "centrifugo"
    }

    async fn publish(&self, channel: &str, progress: &CauseProgress) -> Result<(), PublishError> {
        let response = self
            .http
            .post(&self.publish_url)
            .header("X-API-Key", &self.api_key)
            .json(&PublishRequest {
                channel,
                data: progress,
            })
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Transport(format!("http {status}")));
        }
        Ok(())
    }
}
