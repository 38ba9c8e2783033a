//! Routes inbound chat events to the orchestrator.
//!
//! Every event that carries the command prefix gets its own task and its own
//! turn. A turn that fails sends one fallback notice to the sender; the
//! error itself is only logged.

use std::sync::Arc;

use chrono::Utc;
use lunabridge_channels::parse_command;
use lunabridge_config::AgentConfig;
use lunabridge_core::channel::{InboundEvent, Notifier};
use lunabridge_core::error::ChannelError;
use lunabridge_core::event::{DomainEvent, EventBus};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::loop_runner::{Orchestrator, Turn};

/// What happened to one inbound event.
#[derive(Debug)]
pub enum Outcome {
    /// Not a command; nothing was sent anywhere
    Ignored,
    Completed(Turn),
    /// The turn failed and the fallback notice was attempted
    Failed(lunabridge_core::Error),
}

pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn Notifier>,
    prefix: String,
    fallback_message: String,
    event_bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        notifier: Arc<dyn Notifier>,
        config: &AgentConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            orchestrator,
            notifier,
            prefix: config.command_prefix.clone(),
            fallback_message: config.fallback_message.clone(),
            event_bus,
        }
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let Some(prompt) = parse_command(&event, &self.prefix) else {
            debug!(kind = %event.kind, "Ignoring non-command event");
            return Outcome::Ignored;
        };

        info!(sender = %event.from, prompt = %prompt, "Command detected");
        self.event_bus.publish(DomainEvent::CommandReceived {
            sender: event.from.clone(),
            prompt_preview: prompt.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        match self.orchestrator.run_turn(&event, &prompt).await {
            Ok(turn) => Outcome::Completed(turn),
            Err(e) => {
                error!(sender = %event.from, error = %e, "Command processing failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "turn".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                if let Err(notify_err) = self
                    .notifier
                    .notify(std::slice::from_ref(&event.from), &self.fallback_message)
                    .await
                {
                    warn!(error = %notify_err, "Fallback notice could not be delivered");
                }
                Outcome::Failed(e)
            }
        }
    }

    /// Consume an event stream, one task per event, until it closes.
    ///
    /// Returns once the stream has ended and every started turn finished.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Result<InboundEvent, ChannelError>>) {
        let mut turns = JoinSet::new();

        while let Some(item) = rx.recv().await {
            match item {
                Ok(event) => {
                    let dispatcher = Arc::clone(&self);
                    turns.spawn(async move { dispatcher.handle(event).await });
                }
                Err(e) => warn!(error = %e, "Inbound channel error"),
            }
            while let Some(joined) = turns.try_join_next() {
                self.reap(joined);
            }
        }

        info!(pending = turns.len(), "Inbound stream closed, draining turns");
        while let Some(joined) = turns.join_next().await {
            self.reap(joined);
        }
    }

    /// A turn task that panicked or was cancelled never produced an outcome.
    fn reap(&self, joined: Result<Outcome, JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "Turn task did not finish");
            self.event_bus.publish(DomainEvent::ErrorOccurred {
                context: "turn task".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}
