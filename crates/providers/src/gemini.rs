//! Google Gemini provider over the `generateContent` REST API.
//!
//! Supports:
//! - System instructions
//! - Function declarations and function-call parts
//! - Function-response turns (sent with the `user` role)
//! - Thought signatures on function calls, replayed in later turns

use async_trait::async_trait;
use lunabridge_core::error::ProviderError;
use lunabridge_core::message::{FunctionCall, Message, Role};
use lunabridge_core::provider::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini model provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Point at a different API root (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Convert the conversation into Gemini `contents`.
    ///
    /// System messages are skipped here; they travel in `system_instruction`.
    fn to_api_contents(messages: &[Message]) -> Vec<ApiContent> {
        messages
            .iter()
            .filter_map(|m| {
                let (role, parts) = match m.role {
                    Role::System => return None,
                    Role::User => ("user", vec![ApiPart::text(&m.content)]),
                    Role::Assistant => {
                        let mut parts = Vec::new();
                        if !m.content.is_empty() {
                            parts.push(ApiPart::text(&m.content));
                        }
                        parts.extend(m.tool_calls.iter().map(|call| ApiPart {
                            function_call: Some(ApiFunctionCall {
                                name: call.name.clone(),
                                args: call.args.clone(),
                            }),
                            thought_signature: call.thought_signature.clone(),
                            ..Default::default()
                        }));
                        ("model", parts)
                    }
                    Role::Tool => (
                        "user",
                        m.function_responses
                            .iter()
                            .map(|r| ApiPart {
                                function_response: Some(ApiFunctionResponse {
                                    name: r.name.clone(),
                                    response: r.response.clone(),
                                }),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                };
                Some(ApiContent {
                    role: Some(role.into()),
                    parts,
                })
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDescriptor]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        json!([{ "functionDeclarations": declarations }])
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let mut body = json!({ "contents": Self::to_api_contents(&request.messages) });

        if let Some(system) = &request.system_instruction {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !request.tools.is_empty() {
            body["tools"] = Self::to_api_tools(&request.tools);
        }
        if let Some(temperature) = request.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }
        body
    }
}

#[async_trait]
impl lunabridge_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured("GEMINI_API_KEY is not set".into()));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::build_body(&request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No candidates in response".into(),
            })?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(fc) = part.function_call {
                let call = FunctionCall::new(fc.name, fc.args);
                calls.push(match part.thought_signature {
                    Some(signature) => call.with_thought_signature(signature),
                    None => call,
                });
            }
        }

        let usage = api_response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            message: Message::assistant(text).with_tool_calls(calls),
            usage,
            model: api_response.model_version.unwrap_or(request.model),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", &self.api_key)])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<ApiFunctionResponse>,
    /// Sibling of `functionCall`, not nested inside it.
    #[serde(skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl ApiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
