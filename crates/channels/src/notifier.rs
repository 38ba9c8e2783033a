//! Direct delivery through the chat send API.
//!
//! Used only for the fallback notice; normal replies go through the reply
//! tool on the endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use lunabridge_core::channel::Notifier;
use lunabridge_core::error::ChannelError;
use lunabridge_security::CredentialManager;
use serde_json::json;
use tracing::{debug, warn};

/// Posts `{to, message}` to the send URL with the current credential.
pub struct HttpNotifier {
    url: String,
    credentials: Arc<CredentialManager>,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, credentials: Arc<CredentialManager>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            url: url.into(),
            credentials,
            client,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, to: &[String], message: &str) -> Result<(), ChannelError> {
        debug!(recipients = to.len(), "Sending direct notice");

        let response = self
            .client
            .post(&self.url)
            .header("bearer", self.credentials.current())
            .json(&json!({ "to": to, "message": message }))
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "http".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Send API refused notice");
            return Err(ChannelError::DeliveryFailed {
                channel: "http".into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}
