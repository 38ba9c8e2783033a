//! Language model providers for the Luna bridge.
//!
//! Providers implement the `lunabridge_core::Provider` trait. Gemini's
//! `generateContent` API is the only backend.

pub mod gemini;

pub use gemini::GeminiProvider;
