//! # Luna Bridge Core
//!
//! Domain types, traits, and error definitions for the Luna bridge: a service
//! that turns `/luna` chat commands into a tool-calling conversation with a
//! language model.
//!
//! ## Design Philosophy
//!
//! Every collaborator that crosses a network boundary is a trait here:
//! the model ([`Provider`]), the tool-execution endpoint ([`ToolEndpoint`]),
//! the login service ([`Authenticator`]), the inbound chat stream
//! ([`Channel`]) and the outbound fallback sender ([`Notifier`]).
//! Implementations live in their respective crates, and tests substitute
//! scripted mocks.

pub mod auth;
pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use auth::Authenticator;
pub use channel::{Channel, InboundEvent, Notifier, QuotedMessage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, FunctionCall, FunctionResponse, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDescriptor, Usage};
pub use tool::{RawTool, ToolEndpoint, ToolOutput};
