//! Message and Conversation domain types.
//!
//! A conversation is the per-turn history sent to the model on every call:
//! the composed user prompt, the model's function-call requests, and the
//! function-response turns that answer them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (one inbound command).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Function responses fed back to the model
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,

    /// Opaque signature the model attached to this call. It must be echoed
    /// back unchanged when the call is replayed in the history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
            thought_signature: None,
        }
    }

    pub fn with_thought_signature(mut self, signature: impl Into<String>) -> Self {
        self.thought_signature = Some(signature.into());
        self
    }
}

/// The answer to a [`FunctionCall`], carried back to the model.
///
/// The payload is always an object with exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

impl FunctionResponse {
    /// A successful invocation carrying the endpoint's content blocks.
    pub fn result(name: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            response: serde_json::json!({ "result": content }),
        }
    }

    /// A failed invocation carrying an error message.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    #[serde(default)]
    pub content: String,

    /// Function calls requested by the model (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<FunctionCall>,

    /// Function responses (only on `Role::Tool` messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_responses: Vec<FunctionResponse>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            function_responses: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a function-response turn answering one or more calls.
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        let mut msg = Self::with_role(Role::Tool, String::new());
        msg.function_responses = responses;
        msg
    }

    /// Attach function calls to an assistant message.
    pub fn with_tool_calls(mut self, calls: Vec<FunctionCall>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// An ordered sequence of messages for one inbound command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hola Luna");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hola Luna");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn function_response_result_shape() {
        let resp = FunctionResponse::result(
            "consultar_placa",
            serde_json::json!([{"type": "text", "text": "ABC123 activo"}]),
        );
        assert!(!resp.is_error());
        assert_eq!(resp.response["result"][0]["text"], "ABC123 activo");
        assert!(resp.response.get("error").is_none());
    }

    #[test]
    fn function_response_error_shape() {
        let resp = FunctionResponse::error("consultar_placa", "upstream timeout");
        assert!(resp.is_error());
        assert_eq!(resp.response["error"], "upstream timeout");
        assert!(resp.response.get("result").is_none());
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
        assert_eq!(conv.last().map(|m| m.content.as_str()), Some("First message"));
    }

    #[test]
    fn tool_message_carries_responses() {
        let msg = Message::function_responses(vec![FunctionResponse::error("x", "nope")]);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.function_responses.len(), 1);
    }
}
