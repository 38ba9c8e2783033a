//! Credential handling for the Luna bridge.
//!
//! Provides:
//! - **CredentialManager**: the single process-wide bearer token, replaced
//!   only through `refresh()`
//! - **HttpAuthenticator**: the login call that issues fresh tokens

pub mod credential;
pub mod login;

pub use credential::{CredentialManager, CredentialState};
pub use login::HttpAuthenticator;
