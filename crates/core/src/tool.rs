//! Tool endpoint trait: the abstraction over the external service that
//! actually executes tool invocations on behalf of the model.
//!
//! The bridge never runs tools itself. It opens a session with the endpoint,
//! asks it which tools exist, and forwards the model's calls to it.

use crate::error::EndpointError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool as published by the endpoint, before sanitizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTool {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(
        default,
        rename = "inputSchema",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<serde_json::Value>,
}

/// The successful result of a tool invocation: the endpoint's content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
}

impl ToolOutput {
    /// Concatenated `text` of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The core ToolEndpoint trait.
///
/// `connect` must be called (and succeed) before `list_tools` or `call_tool`.
/// Implementations classify credential rejections as
/// [`EndpointError::AuthRejected`].
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    /// A human-readable name for logs (e.g., the endpoint URL).
    fn name(&self) -> &str;

    /// Open a session authenticated with `credential`.
    async fn connect(&self, credential: &str) -> std::result::Result<(), EndpointError>;

    /// The tools currently published by the endpoint, in its order.
    async fn list_tools(&self) -> std::result::Result<Vec<RawTool>, EndpointError>;

    /// Execute a tool over the established session.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, EndpointError>;
}
