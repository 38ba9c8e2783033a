//! Session lifecycle with the tool endpoint.
//!
//! `connect()` opens a session with the current credential and discovers the
//! published tools. When the endpoint rejects the credential the connector
//! invalidates it, asks the [`CredentialManager`] for a new one, waits a fixed
//! delay and tries again. Any other failure ends the attempt.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use lunabridge_core::error::EndpointError;
use lunabridge_core::event::{DomainEvent, EventBus};
use lunabridge_core::provider::ToolDescriptor;
use lunabridge_core::tool::{ToolEndpoint, ToolOutput};
use lunabridge_security::CredentialManager;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the delay after a credential rejection
    Retrying,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("Gave up after {attempts} rejected attempts: {last}")]
    RetriesExhausted { attempts: u32, last: EndpointError },
}

pub struct SessionConnector {
    endpoint: Arc<dyn ToolEndpoint>,
    credentials: Arc<CredentialManager>,
    registry: Arc<crate::ToolRegistryAdapter>,
    state: RwLock<ConnectionState>,
    retry_delay: Duration,
    max_auth_retries: Option<u32>,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionConnector {
    pub fn new(
        endpoint: Arc<dyn ToolEndpoint>,
        credentials: Arc<CredentialManager>,
        registry: Arc<crate::ToolRegistryAdapter>,
    ) -> Self {
        Self {
            endpoint,
            credentials,
            registry,
            state: RwLock::new(ConnectionState::Disconnected),
            retry_delay: Duration::from_secs(2),
            max_auth_retries: None,
            event_bus: None,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Cap the number of refresh-and-retry cycles. `None` retries forever.
    pub fn with_max_auth_retries(mut self, max: Option<u32>) -> Self {
        self.max_auth_retries = max;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Tool descriptors from the last successful discovery.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    /// Establish a session and load the tool list.
    ///
    /// Both steps run under the same classification: a credential rejection
    /// from either one triggers refresh-and-retry.
    pub async fn connect(&self) -> Result<Vec<ToolDescriptor>, ConnectError> {
        let mut rejections: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            let token = self.credentials.current();

            let attempt = async {
                self.endpoint.connect(&token).await?;
                self.registry.discover().await
            }
            .await;

            match attempt {
                Ok(descriptors) => {
                    self.set_state(ConnectionState::Connected);
                    info!(
                        endpoint = %self.endpoint.name(),
                        tools = descriptors.len(),
                        "Tool endpoint session ready"
                    );
                    self.publish(DomainEvent::SessionConnected {
                        endpoint: self.endpoint.name().to_string(),
                        tool_count: descriptors.len(),
                        timestamp: Utc::now(),
                    });
                    return Ok(descriptors);
                }
                Err(e) if e.is_auth_failure() => {
                    self.credentials.invalidate();
                    rejections += 1;

                    if self.max_auth_retries.is_some_and(|max| rejections > max) {
                        error!(attempts = rejections, error = %e, "Credential keeps being rejected, giving up");
                        self.set_state(ConnectionState::Disconnected);
                        return Err(ConnectError::RetriesExhausted {
                            attempts: rejections,
                            last: e,
                        });
                    }

                    warn!(
                        attempt = rejections,
                        error = %e,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        "Credential rejected, refreshing and retrying"
                    );
                    self.set_state(ConnectionState::Retrying);
                    // A failed login leaves the old token; the next attempt reports it.
                    let _ = self.credentials.refresh().await;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(endpoint = %self.endpoint.name(), error = %e, "Could not connect to tool endpoint");
                    self.set_state(ConnectionState::Disconnected);
                    self.publish(DomainEvent::ErrorOccurred {
                        context: "connect".into(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            }
        }
    }

    /// Run `connect()` on a background task.
    pub fn spawn_background_connect(self: Arc<Self>) -> JoinHandle<Result<Vec<ToolDescriptor>, ConnectError>> {
        tokio::spawn(async move { self.connect().await })
    }

    /// Forward one invocation to the endpoint.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, EndpointError> {
        let started = std::time::Instant::now();
        let result = self.endpoint.call_tool(name, arguments).await;

        self.publish(DomainEvent::ToolExecuted {
            tool_name: name.to_string(),
            success: result.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        if let Err(e) = &result {
            if e.is_auth_failure() {
                self.credentials.invalidate();
            }
        }
        result
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
