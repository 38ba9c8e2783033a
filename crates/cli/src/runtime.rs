//! Wiring shared by every subcommand.

use std::sync::Arc;
use std::time::Duration;

use lunabridge_agent::{Dispatcher, Orchestrator};
use lunabridge_channels::HttpNotifier;
use lunabridge_config::BridgeConfig;
use lunabridge_core::event::EventBus;
use lunabridge_providers::GeminiProvider;
use lunabridge_security::{CredentialManager, HttpAuthenticator};
use lunabridge_tools::{McpHttpEndpoint, SessionConnector, ToolRegistryAdapter};
use tracing::debug;

/// Every long-lived component, built once from the configuration.
pub struct Bridge {
    pub config: BridgeConfig,
    pub event_bus: Arc<EventBus>,
    pub credentials: Arc<CredentialManager>,
    pub connector: Arc<SessionConnector>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Bridge {
    pub fn build(config: BridgeConfig) -> Self {
        let event_bus = Arc::new(EventBus::default());

        let authenticator = Arc::new(HttpAuthenticator::new(
            &config.login_url,
            config.login_user.clone().unwrap_or_default(),
            config.login_password.clone().unwrap_or_default(),
        ));
        let credentials = Arc::new(
            CredentialManager::new(config.seed_token.clone().unwrap_or_default(), authenticator)
                .with_event_bus(event_bus.clone()),
        );

        let endpoint = Arc::new(McpHttpEndpoint::new(&config.mcp_url));
        let registry = Arc::new(ToolRegistryAdapter::new(endpoint.clone()));
        let connector = Arc::new(
            SessionConnector::new(endpoint, credentials.clone(), registry)
                .with_retry_delay(Duration::from_secs(config.connector.retry_delay_secs))
                .with_max_auth_retries(config.connector.max_auth_retries)
                .with_event_bus(event_bus.clone()),
        );

        let provider = Arc::new(GeminiProvider::with_base_url(
            &config.gemini_base_url,
            config.gemini_api_key.clone().unwrap_or_default(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            provider,
            connector.clone(),
            &config.agent,
            event_bus.clone(),
        ));
        let notifier = Arc::new(HttpNotifier::new(&config.send_url, credentials.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            orchestrator,
            notifier,
            &config.agent,
            event_bus.clone(),
        ));

        Self {
            config,
            event_bus,
            credentials,
            connector,
            dispatcher,
        }
    }

    /// Log every domain event at debug level.
    pub fn spawn_event_log(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                debug!(event = ?event, "Domain event");
            }
        })
    }
}
