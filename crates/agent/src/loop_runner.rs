//! The tool-calling loop.

use std::sync::Arc;

use chrono::Utc;
use lunabridge_config::{AgentConfig, PendingCallPolicy};
use lunabridge_core::channel::InboundEvent;
use lunabridge_core::error::EndpointError;
use lunabridge_core::event::{DomainEvent, EventBus};
use lunabridge_core::message::{Conversation, FunctionCall, FunctionResponse, Message};
use lunabridge_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDescriptor};
use lunabridge_tools::SessionConnector;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::prompt::compose_prompt;

/// State of one command from first prompt to final response.
#[derive(Debug)]
pub struct Turn {
    pub conversation: Conversation,
    pub last_response: Option<ProviderResponse>,
    /// The latest response still holds unanswered function calls
    pub awaiting_calls: bool,
    pub model_calls: u32,
}

impl Turn {
    fn new(prompt: String) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(prompt));
        Self {
            conversation,
            last_response: None,
            awaiting_calls: false,
            model_calls: 0,
        }
    }
}

/// Drives model ↔ endpoint round-trips until the model stops calling tools.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    connector: Arc<SessionConnector>,
    model: String,
    temperature: Option<f32>,
    system_prompt: String,
    reply_tool: String,
    max_iterations: u32,
    pending_calls: PendingCallPolicy,
    event_bus: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        connector: Arc<SessionConnector>,
        config: &AgentConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            connector,
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
            reply_tool: config.reply_tool.clone(),
            max_iterations: config.max_iterations.max(1),
            pending_calls: config.pending_calls,
            event_bus,
        }
    }

    /// Run one turn for `event`, whose command text is `user_text`.
    ///
    /// Tool failures are fed back to the model and never end the turn.
    /// Model failures and exceeding the iteration cap do.
    pub async fn run_turn(
        &self,
        event: &InboundEvent,
        user_text: &str,
    ) -> Result<Turn, lunabridge_core::Error> {
        let tools = self.connector.descriptors();
        let mut turn = Turn::new(compose_prompt(event, user_text, &self.reply_tool));

        info!(
            conversation_id = %turn.conversation.id,
            tools = tools.len(),
            "Starting turn"
        );

        loop {
            if turn.model_calls >= self.max_iterations {
                warn!(
                    conversation_id = %turn.conversation.id,
                    iterations = turn.model_calls,
                    "Model kept calling tools past the iteration cap"
                );
                return Err(lunabridge_core::Error::IterationLimit(self.max_iterations));
            }

            let response = self.send(&mut turn, &tools).await?;
            let calls = response.message.tool_calls.clone();
            turn.awaiting_calls = !calls.is_empty();
            turn.conversation.push(response.message.clone());
            turn.last_response = Some(response);

            if calls.is_empty() {
                info!(
                    conversation_id = %turn.conversation.id,
                    model_calls = turn.model_calls,
                    "Tool execution finished"
                );
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    conversation_id: turn.conversation.id.to_string(),
                    model_calls: turn.model_calls,
                    timestamp: Utc::now(),
                });
                return Ok(turn);
            }

            let selected = self.select(calls);
            let mut answers = Vec::with_capacity(selected.len());
            for call in selected {
                answers.push(self.execute(call).await);
            }
            turn.conversation.push(Message::function_responses(answers));
        }
    }

    async fn send(
        &self,
        turn: &mut Turn,
        tools: &[ToolDescriptor],
    ) -> Result<ProviderResponse, lunabridge_core::Error> {
        let request = ProviderRequest {
            model: self.model.clone(),
            system_instruction: Some(self.system_prompt.clone()),
            messages: turn.conversation.messages.clone(),
            temperature: self.temperature,
            tools: tools.to_vec(),
        };

        turn.model_calls += 1;
        debug!(
            conversation_id = %turn.conversation.id,
            iteration = turn.model_calls,
            "Calling model"
        );
        let response = self.provider.complete(request).await?;

        if let Some(usage) = &response.usage {
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                conversation_id: turn.conversation.id.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }
        Ok(response)
    }

    fn select(&self, mut calls: Vec<FunctionCall>) -> Vec<FunctionCall> {
        match self.pending_calls {
            PendingCallPolicy::All => {
                if calls.len() > 1 {
                    info!(count = calls.len(), "Executing every pending function call");
                }
                calls
            }
            PendingCallPolicy::FirstOnly => {
                if calls.len() > 1 {
                    let ignored: Vec<&str> = calls[1..].iter().map(|c| c.name.as_str()).collect();
                    warn!(?ignored, "Answering only the first function call");
                }
                calls.truncate(1);
                calls
            }
        }
    }

    async fn execute(&self, call: FunctionCall) -> FunctionResponse {
        info!(tool = %call.name, args = %call.args, "Model requested tool");

        let args = match call.args {
            Value::Null => Value::Object(Default::default()),
            args => args,
        };

        match self.connector.call_tool(&call.name, args).await {
            Ok(output) => {
                debug!(tool = %call.name, blocks = output.content.len(), "Tool succeeded");
                FunctionResponse::result(call.name, Value::Array(output.content))
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                let message = match e {
                    EndpointError::ToolFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                FunctionResponse::error(call.name, message)
            }
        }
    }
}
