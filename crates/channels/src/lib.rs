//! Chat-side plumbing for the Luna bridge.
//!
//! Inbound sources implement `lunabridge_core::Channel`; the fallback sender
//! implements `lunabridge_core::Notifier`.
//!
//! - **command**: detects the command prefix and extracts the prompt
//! - **webhook**: HTTP listener that accepts transport events as JSON
//! - **console**: reads commands from stdin for local testing
//! - **notifier**: posts plain messages to the chat send API

pub mod command;
pub mod console;
pub mod notifier;
pub mod webhook;

pub use command::parse_command;
pub use console::ConsoleSource;
pub use notifier::HttpNotifier;
pub use webhook::{WebhookListener, WebhookSettings};
