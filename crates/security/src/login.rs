//! HTTP login client.
//!
//! POSTs `{"user", "password"}` to the login endpoint and expects
//! `{"data": {"token": "..."}}` back.

use async_trait::async_trait;
use lunabridge_core::auth::Authenticator;
use lunabridge_core::error::AuthError;
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct LoginBody<'a> {
    user: &'a str,
    password: &'a str,
}

/// Authenticator backed by a JSON login endpoint.
pub struct HttpAuthenticator {
    url: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl HttpAuthenticator {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            client,
        }
    }
}

/// Pull `data.token` out of a login response body.
fn extract_token(body: &serde_json::Value) -> Option<String> {
    body.get("data")?
        .get("token")?
        .as_str()
        .filter(|t| !t.is_empty())
        .map(String::from)
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn login(&self) -> Result<String, AuthError> {
        debug!(url = %self.url, user = %self.user, "Sending login request");

        let response = self
            .client
            .post(&self.url)
            .json(&LoginBody {
                user: &self.user,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("Invalid login response: {e}")))?;

        extract_token(&body).ok_or(AuthError::MissingToken)
    }
}

impl std::fmt::Debug for HttpAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthenticator")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
