//! Authenticator trait: the login call that issues a fresh bearer token.

use crate::error::AuthError;
use async_trait::async_trait;

/// Exchanges configured identity credentials for a bearer token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> std::result::Result<String, AuthError>;
}
