//! Error types for the Luna bridge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for a bridge turn.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool endpoint errors ---
    #[error("Tool endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Authentication errors ---
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Orchestration ---
    #[error("Tool loop exceeded {0} model round-trips")]
    IterationLimit(u32),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures talking to the tool-execution endpoint.
///
/// `AuthRejected` is the typed classification the session connector keys its
/// refresh-and-retry policy on.
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    #[error("Endpoint rejected credential: {0}")]
    AuthRejected(String),

    #[error("Endpoint returned HTTP {status_code}: {message}")]
    Http { status_code: u16, message: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Tool call failed: {tool_name}: {reason}")]
    ToolFailed { tool_name: String, reason: String },

    #[error("Invalid endpoint response: {0}")]
    InvalidResponse(String),

    #[error("No session established with the tool endpoint")]
    NotConnected,

    #[error("Network error: {0}")]
    Network(String),
}

impl EndpointError {
    /// Whether this failure means the credential was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, EndpointError::AuthRejected(_))
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Login request failed: {0}")]
    Network(String),

    #[error("Login rejected with status {status_code}: {message}")]
    Rejected { status_code: u16, message: String },

    #[error("Login response did not contain a token")]
    MissingToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn only_auth_rejection_counts_as_auth_failure() {
        let rejected = EndpointError::AuthRejected("HTTP 401: Token expired".into());
        assert!(rejected.is_auth_failure());

        let unrelated = EndpointError::Http {
            status_code: 500,
            message: "boom".into(),
        };
        assert!(!unrelated.is_auth_failure());
        assert!(!EndpointError::Network("connection refused".into()).is_auth_failure());
    }

    #[test]
    fn endpoint_error_converts_into_top_level() {
        let err: Error = EndpointError::NotConnected.into();
        assert!(matches!(err, Error::Endpoint(EndpointError::NotConnected)));
    }
}
