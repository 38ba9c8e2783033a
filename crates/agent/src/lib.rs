//! The Luna turn engine.
//!
//! Each qualifying chat command becomes one turn:
//!
//! 1. **Filter**: only `chat` events carrying the command prefix are handled
//! 2. **Compose**: recipient, user text, quoted context and message id
//! 3. **Send to the model** with the endpoint's tool descriptors
//! 4. **If function calls**: execute them on the endpoint, answer, loop to 3
//! 5. **If no calls**: the turn ends; the model already replied via the reply tool
//!
//! Any unrecoverable failure sends one fallback notice to the sender.

pub mod dispatcher;
pub mod loop_runner;
pub mod prompt;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Dispatcher, Outcome};
pub use loop_runner::{Orchestrator, Turn};
pub use prompt::compose_prompt;
