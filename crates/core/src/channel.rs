//! Channel trait: the abstraction over the chat transport.
//!
//! A Channel yields inbound chat events (the transport's `whatsapp_message`
//! payloads). A Notifier sends a plain message straight to a recipient,
//! bypassing the model; it is only used for the fallback failure notice.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// A quoted (replied-to) message attached to an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotedMessage {
    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub from: String,
}

impl QuotedMessage {
    /// Display name of the quoted author, falling back to the raw sender id.
    pub fn author(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.from,
        }
    }
}

/// An event received from the chat transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Message text
    #[serde(default)]
    pub body: String,

    /// Transport message type; only `"chat"` is acted on
    #[serde(default, rename = "type")]
    pub kind: String,

    /// Recipient number replies should go to
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: String,

    /// Transport message id, used for reply threading
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,

    /// Raw sender id, used for the fallback notice
    #[serde(default, deserialize_with = "string_or_number")]
    pub from: String,

    #[serde(default)]
    pub has_quoted_msg: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message: Option<QuotedMessage>,
}

impl InboundEvent {
    /// A plain-text chat event, as the transport would deliver it.
    pub fn chat(
        body: impl Into<String>,
        number: impl Into<String>,
        id: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            kind: "chat".into(),
            number: number.into(),
            id: id.into(),
            from: from.into(),
            has_quoted_msg: false,
            quoted_message: None,
        }
    }

    /// The quoted message, only when the transport flagged one.
    pub fn quoted(&self) -> Option<&QuotedMessage> {
        if self.has_quoted_msg {
            self.quoted_message.as_ref()
        } else {
            None
        }
    }
}

/// Transports send ids as strings or bare numbers depending on the field.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// The core Channel trait: a source of inbound chat events.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "webhook", "console").
    fn name(&self) -> &str;

    /// Start listening and return the stream of inbound events.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundEvent, ChannelError>>,
        ChannelError,
    >;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

/// Direct outbound delivery that bypasses the model.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: &[String], message: &str) -> std::result::Result<(), ChannelError>;
}
