//! Tool registry adapter.
//!
//! Asks the endpoint which tools exist and republishes them as
//! [`ToolDescriptor`]s the model can call. The last discovered set is cached
//! so each new turn can read it without a network call.

use std::sync::{Arc, RwLock};

use lunabridge_core::error::EndpointError;
use lunabridge_core::provider::ToolDescriptor;
use lunabridge_core::tool::{RawTool, ToolEndpoint};
use tracing::info;

use crate::schema::sanitize_schema;

/// Discovers endpoint tools and caches their model-facing descriptors.
pub struct ToolRegistryAdapter {
    endpoint: Arc<dyn ToolEndpoint>,
    descriptors: RwLock<Vec<ToolDescriptor>>,
}

impl ToolRegistryAdapter {
    pub fn new(endpoint: Arc<dyn ToolEndpoint>) -> Self {
        Self {
            endpoint,
            descriptors: RwLock::new(Vec::new()),
        }
    }

    /// Query the endpoint and replace the cached descriptor set.
    ///
    /// Order follows the endpoint's listing. Errors are returned untouched
    /// and leave the previous cache in place.
    pub async fn discover(&self) -> Result<Vec<ToolDescriptor>, EndpointError> {
        let raw = self.endpoint.list_tools().await?;
        let descriptors: Vec<ToolDescriptor> = raw.into_iter().map(to_descriptor).collect();

        *self
            .descriptors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = descriptors.clone();

        info!(
            endpoint = %self.endpoint.name(),
            count = descriptors.len(),
            "Tool descriptors loaded"
        );
        Ok(descriptors)
    }

    /// The most recently discovered descriptors (empty before discovery).
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.descriptors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Convert one published tool into a model-facing descriptor.
pub fn to_descriptor(tool: RawTool) -> ToolDescriptor {
    let description = match tool.description {
        Some(d) if !d.trim().is_empty() => d,
        _ => format!("Tool {}", tool.name),
    };
    let schema = tool
        .input_schema
        .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));

    ToolDescriptor {
        name: tool.name,
        description,
        parameters: sanitize_schema(&schema),
    }
}
