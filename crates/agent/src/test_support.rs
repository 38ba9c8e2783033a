//! Shared test helpers for turn and dispatch tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lunabridge_config::AgentConfig;
use lunabridge_core::auth::Authenticator;
use lunabridge_core::channel::{InboundEvent, Notifier};
use lunabridge_core::error::{AuthError, ChannelError, EndpointError, ProviderError};
use lunabridge_core::event::EventBus;
use lunabridge_core::message::{FunctionCall, Message};
use lunabridge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use lunabridge_core::tool::{RawTool, ToolEndpoint, ToolOutput};
use lunabridge_security::CredentialManager;
use lunabridge_tools::{SessionConnector, ToolRegistryAdapter};
use serde_json::{Value, json};

use crate::loop_runner::Orchestrator;

/// A mock provider that returns a sequence of scripted responses and
/// records every request it receives.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Ok).rev().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(vec![Err(error)]),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedProvider: no more responses")
    }
}

/// Endpoint that answers every tool with `ok:<name>` except `broken`.
pub struct ScriptedEndpoint {
    calls: Mutex<Vec<String>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolEndpoint for ScriptedEndpoint {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self, _credential: &str) -> Result<(), EndpointError> {
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<RawTool>, EndpointError> {
        Ok(vec![RawTool {
            name: "Enviar_Mensaje_WhatsApp".into(),
            description: Some("Send a WhatsApp message".into()),
            input_schema: Some(json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": { "to": { "type": "array" }, "message": { "type": "string" } }
            })),
        }])
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<ToolOutput, EndpointError> {
        self.calls.lock().unwrap().push(name.to_string());
        if name == "broken" {
            return Err(EndpointError::ToolFailed {
                tool_name: name.into(),
                reason: "placa no encontrada".into(),
            });
        }
        Ok(ToolOutput {
            content: vec![json!({ "type": "text", "text": format!("ok:{name}") })],
        })
    }
}

struct NoLogin;

#[async_trait]
impl Authenticator for NoLogin {
    async fn login(&self) -> Result<String, AuthError> {
        Err(AuthError::MissingToken)
    }
}

/// Records notices instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Vec<String>, String)>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: &[String], message: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((to.to_vec(), message.to_string()));
        if self.fail {
            return Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "refused".into(),
            });
        }
        Ok(())
    }
}

pub fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
    }
}

pub fn calls(requested: &[(&str, Value)]) -> ProviderResponse {
    let mut response = text("");
    response.message = response.message.with_tool_calls(
        requested
            .iter()
            .map(|(name, args)| FunctionCall::new(*name, args.clone()))
            .collect(),
    );
    response
}

pub fn chat(body: &str) -> InboundEvent {
    InboundEvent::chat(body, "573001112233", "wamid.1", "573001112233@c.us")
}

/// An orchestrator wired to a connected scripted endpoint.
pub async fn orchestrator(
    provider: Arc<ScriptedProvider>,
    endpoint: Arc<ScriptedEndpoint>,
    config: AgentConfig,
) -> Orchestrator {
    let credentials = Arc::new(CredentialManager::new("seed", Arc::new(NoLogin)));
    let registry = Arc::new(ToolRegistryAdapter::new(endpoint.clone()));
    let connector = Arc::new(SessionConnector::new(endpoint, credentials, registry));
    connector.connect().await.unwrap();
    Orchestrator::new(provider, connector, &config, Arc::new(EventBus::default()))
}
