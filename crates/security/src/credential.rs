//! The bearer credential shared by the session connector and the notifier.
//!
//! There is exactly one active token. Every component that needs it holds an
//! `Arc<CredentialManager>` and reads `current()` at the moment it builds a
//! request; the only writer is `refresh()`.
//!
//! A refresh racing an in-flight tool call is not synchronised: the call keeps
//! whatever token it was issued with.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use lunabridge_core::auth::Authenticator;
use lunabridge_core::error::AuthError;
use lunabridge_core::event::{DomainEvent, EventBus};
use tracing::{info, warn};

/// Whether the active token is believed to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Seeded or freshly issued; assumed good until a call says otherwise
    Valid,
    /// A login failed or the endpoint rejected the token
    Unknown,
}

struct Slot {
    token: String,
    state: CredentialState,
}

/// Holder of the current bearer token.
pub struct CredentialManager {
    slot: RwLock<Slot>,
    authenticator: Arc<dyn Authenticator>,
    event_bus: Option<Arc<EventBus>>,
}

impl CredentialManager {
    /// Start with a pre-seeded token, optimistically treated as valid.
    pub fn new(seed: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                token: seed.into(),
                state: CredentialState::Valid,
            }),
            authenticator,
            event_bus: None,
        }
    }

    /// Publish `CredentialRefreshed` events on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// The active token.
    pub fn current(&self) -> String {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .token
            .clone()
    }

    pub fn state(&self) -> CredentialState {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
    }

    /// Record that the endpoint rejected the current token.
    pub fn invalidate(&self) {
        self.slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state = CredentialState::Unknown;
    }

    /// Log in again and replace the token on success.
    ///
    /// On failure the previous token stays active and the error is logged and
    /// returned; callers are free to ignore it.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        info!("Refreshing bearer credential");
        let outcome = self.authenticator.login().await;

        let success = outcome.is_ok();
        {
            let mut slot = self
                .slot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match &outcome {
                Ok(token) => {
                    slot.token = token.clone();
                    slot.state = CredentialState::Valid;
                }
                Err(_) => slot.state = CredentialState::Unknown,
            }
        }

        match &outcome {
            Ok(_) => info!("New bearer credential obtained"),
            Err(e) => warn!(error = %e, "Credential refresh failed, keeping previous token"),
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::CredentialRefreshed {
                success,
                timestamp: Utc::now(),
            });
        }

        outcome.map(|_| ())
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("token", &"[REDACTED]")
            .field("state", &self.state())
            .finish()
    }
}
