//! MCP client over the streamable HTTP transport.
//!
//! Session handling, paging and JSON-RPC framing are left to `rmcp`. This
//! module supplies the HTTP client underneath it: the bearer credential
//! travels in a default `x-api-key` header, and every rejected POST is
//! classified before rmcp sees it, so the session connector still gets a
//! typed [`EndpointError::AuthRejected`] for HTTP 400/401 and for JSON-RPC
//! errors that mention a token.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use lunabridge_core::error::EndpointError;
use lunabridge_core::tool::{RawTool, ToolEndpoint, ToolOutput};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    LoggingMessageNotificationParam, ProtocolVersion,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::common::http_header::{
    EVENT_STREAM_MIME_TYPE, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID, JSON_MIME_TYPE,
};
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpClientTransportConfig, StreamableHttpError,
    StreamableHttpPostResponse,
};
use rmcp::{ClientHandler, RoleClient, ServiceError};
use serde_json::Value;
use sse_stream::{Sse, SseStream};
use tokio::sync::RwLock;
use tracing::{debug, info};

const CREDENTIAL_HEADER: &str = "x-api-key";

/// Last HTTP rejection seen by the transport, waiting to be reported.
type RejectionSlot = Arc<Mutex<Option<EndpointError>>>;

type Session = RunningService<RoleClient, BridgeClientHandler>;

#[derive(Clone)]
struct BridgeClientHandler {
    info: ClientInfo,
}

impl ClientHandler for BridgeClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(level = ?params.level, logger = ?params.logger, data = %params.data, "MCP server log");
    }
}

/// reqwest-backed streamable HTTP client that records rejected POSTs.
#[derive(Clone)]
struct KeyedHttpClient {
    client: reqwest::Client,
    rejection: RejectionSlot,
}

impl KeyedHttpClient {
    fn record(&self, error: EndpointError) {
        debug!(error = %error, "MCP POST rejected");
        *self.rejection.lock().unwrap_or_else(|p| p.into_inner()) = Some(error);
    }
}

impl StreamableHttpClient for KeyedHttpClient {
    type Error = reqwest::Error;

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> Result<BoxStream<'static, Result<Sse, SseError>>, StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .get(uri.as_ref())
            .header(ACCEPT, [EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE].join(", "))
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(last_event_id) = last_event_id {
            request = request.header(HEADER_LAST_EVENT_ID, last_event_id);
        }
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        let response = response.error_for_status()?;

        match response.headers().get(CONTENT_TYPE) {
            Some(ct) if ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes()) => {}
            Some(ct) if ct.as_bytes().starts_with(JSON_MIME_TYPE.as_bytes()) => {}
            other => {
                return Err(StreamableHttpError::UnexpectedContentType(
                    other.map(|ct| String::from_utf8_lossy(ct.as_bytes()).to_string()),
                ));
            }
        }

        Ok(SseStream::from_byte_stream(response.bytes_stream()).boxed())
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session: Arc<str>,
        auth_token: Option<String>,
    ) -> Result<(), StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .delete(uri.as_ref())
            .header(HEADER_SESSION_ID, session.as_ref());
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: rmcp::model::ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_token: Option<String>,
    ) -> Result<StreamableHttpPostResponse, StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .post(uri.as_ref())
            .header(ACCEPT, [EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE].join(", "));
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(session_id) = session_id {
            request = request.header(HEADER_SESSION_ID, session_id.as_ref());
        }

        let response = request.json(&message).send().await?;
        let status = response.status();
        if let Err(e) = response.error_for_status_ref() {
            let body = response.text().await.unwrap_or_default();
            self.record(classify_status(status.as_u16(), body));
            return Err(e.into());
        }

        if matches!(
            status,
            reqwest::StatusCode::ACCEPTED | reqwest::StatusCode::NO_CONTENT
        ) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(String::from);

        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {
                let stream = SseStream::from_byte_stream(response.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(stream, session_id))
            }
            Some(ct) if ct.starts_with(JSON_MIME_TYPE) => {
                let message: rmcp::model::ServerJsonRpcMessage = response.json().await?;
                Ok(StreamableHttpPostResponse::Json(message, session_id))
            }
            _ => {
                // Some servers answer notifications with 200 and no body.
                let bytes = response.bytes().await?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(StreamableHttpPostResponse::Accepted);
                }
                match serde_json::from_slice::<rmcp::model::ServerJsonRpcMessage>(&bytes) {
                    Ok(message) => Ok(StreamableHttpPostResponse::Json(message, session_id)),
                    Err(_) => Err(StreamableHttpError::UnexpectedContentType(content_type)),
                }
            }
        }
    }
}

/// A tool endpoint speaking MCP over streamable HTTP.
pub struct McpHttpEndpoint {
    url: String,
    client_name: String,
    client_version: String,
    session: RwLock<Option<Arc<Session>>>,
    rejection: RejectionSlot,
}

impl McpHttpEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_name: "bot-placas-client".into(),
            client_version: "1.0.0".into(),
            session: RwLock::new(None),
            rejection: RejectionSlot::default(),
        }
    }

    /// Override the `clientInfo` sent on `initialize`.
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: self.client_name.clone(),
                title: None,
                version: self.client_version.clone(),
                icons: None,
                website_url: None,
            },
        }
    }

    /// An HTTP client that sends `credential` on every request.
    fn keyed_client(&self, credential: &str) -> Result<KeyedHttpClient, EndpointError> {
        let mut value = HeaderValue::from_str(credential).map_err(|_| {
            EndpointError::AuthRejected("credential is not a valid header value".into())
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(CREDENTIAL_HEADER), value);

        // No overall timeout: tool calls may legitimately run long.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| EndpointError::Network(format!("build HTTP client: {e}")))?;

        Ok(KeyedHttpClient {
            client,
            rejection: self.rejection.clone(),
        })
    }

    async fn session(&self) -> Result<Arc<Session>, EndpointError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(EndpointError::NotConnected)
    }

    /// Prefer the HTTP rejection recorded by the transport over rmcp's
    /// own rendering of the failure.
    fn rejection_or(&self, fallback: EndpointError) -> EndpointError {
        self.rejection
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .unwrap_or(fallback)
    }

    fn service_error(&self, err: ServiceError) -> EndpointError {
        let fallback = match err {
            ServiceError::McpError(data) => classify_rpc_error(i64::from(data.code.0), &data.message),
            other => EndpointError::Network(other.to_string()),
        };
        self.rejection_or(fallback)
    }
}

#[async_trait]
impl ToolEndpoint for McpHttpEndpoint {
    fn name(&self) -> &str {
        &self.url
    }

    async fn connect(&self, credential: &str) -> Result<(), EndpointError> {
        self.rejection.lock().unwrap_or_else(|p| p.into_inner()).take();

        let transport = StreamableHttpClientTransport::with_client(
            self.keyed_client(credential)?,
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );
        let handler = BridgeClientHandler {
            info: self.client_info(),
        };

        let service = rmcp::serve_client(handler, transport).await.map_err(|e| {
            let message = format!("initialize: {e}");
            self.rejection_or(if mentions_token(&message) {
                EndpointError::AuthRejected(message)
            } else {
                EndpointError::Network(message)
            })
        })?;

        info!(
            url = %self.url,
            server = %service
                .peer()
                .peer_info()
                .map(|info| info.server_info.name.as_str())
                .unwrap_or("unknown"),
            "Connected to MCP server"
        );

        *self.session.write().await = Some(Arc::new(service));
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<RawTool>, EndpointError> {
        let session = self.session().await?;
        let tools = session
            .peer()
            .list_all_tools()
            .await
            .map_err(|e| self.service_error(e))?;

        Ok(tools
            .into_iter()
            .map(|tool| RawTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: Some(Value::Object((*tool.input_schema).clone())),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, EndpointError> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(EndpointError::ToolFailed {
                    tool_name: name.to_string(),
                    reason: format!("arguments must be a JSON object, got {other}"),
                });
            }
        };

        let session = self.session().await?;
        let result = session
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| self.service_error(e))?;

        let failed = result.is_error.unwrap_or(false);
        let output = to_output(result);
        if failed {
            let reason = match output.text() {
                text if text.is_empty() => "tool reported an error".to_string(),
                text => text,
            };
            return Err(EndpointError::ToolFailed {
                tool_name: name.to_string(),
                reason,
            });
        }
        Ok(output)
    }
}

fn to_output(result: CallToolResult) -> ToolOutput {
    let mut content: Vec<Value> = result
        .content
        .iter()
        .filter_map(|block| serde_json::to_value(block).ok())
        .collect();
    if content.is_empty()
        && let Some(structured) = result.structured_content
    {
        content.push(serde_json::json!({ "type": "text", "text": structured.to_string() }));
    }
    ToolOutput { content }
}

/// Map a non-success HTTP status onto the endpoint error taxonomy.
pub fn classify_status(status: u16, body: String) -> EndpointError {
    match status {
        400 | 401 => EndpointError::AuthRejected(format!("HTTP {status}: {body}")),
        _ => EndpointError::Http {
            status_code: status,
            message: body,
        },
    }
}

/// Map a JSON-RPC error object onto the endpoint error taxonomy.
pub fn classify_rpc_error(code: i64, message: &str) -> EndpointError {
    if mentions_token(message) {
        EndpointError::AuthRejected(format!("JSON-RPC {code}: {message}"))
    } else {
        EndpointError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

fn mentions_token(message: &str) -> bool {
    message.to_lowercase().contains("token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::post,
    };
    use serde_json::json;

    const GOOD_TOKEN: &str = "valid-token";

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn initialize_result(name: &str) -> Value {
        json!({
            "protocolVersion": "2025-03-26",
            "serverInfo": { "name": name, "version": "1" },
            "capabilities": { "tools": {} }
        })
    }

    async fn mock_mcp(headers: HeaderMap, Json(req): Json<Value>) -> Response {
        if header(&headers, "x-api-key") != Some(GOOD_TOKEN) {
            return (StatusCode::UNAUTHORIZED, "Invalid Token").into_response();
        }
        let Some(id) = req.get("id").cloned() else {
            return StatusCode::ACCEPTED.into_response();
        };
        let method = req["method"].as_str().unwrap_or_default();
        if method != "initialize" && header(&headers, "mcp-session-id") != Some("sess-1") {
            return (StatusCode::NOT_FOUND, "unknown session").into_response();
        }

        let envelope = match method {
            "initialize" => json!({ "jsonrpc": "2.0", "id": id, "result": initialize_result("oberon-tools") }),
            "tools/list" => {
                let page = if req["params"]["cursor"] == "page-2" {
                    json!({ "tools": [{ "name": "Enviar_Mensaje_WhatsApp", "inputSchema": { "type": "object" } }] })
                } else {
                    json!({
                        "tools": [{ "name": "estado_vehiculo", "description": "Vehicle status", "inputSchema": { "type": "object" } }],
                        "nextCursor": "page-2"
                    })
                };
                json!({ "jsonrpc": "2.0", "id": id, "result": page })
            }
            "tools/call" => match req["params"]["name"].as_str() {
                Some("fails") => json!({ "jsonrpc": "2.0", "id": id, "result": {
                    "content": [{ "type": "text", "text": "plate not found" }],
                    "isError": true
                }}),
                Some("explodes") => json!({ "jsonrpc": "2.0", "id": id, "error": {
                    "code": -32603, "message": "internal failure"
                }}),
                Some("expires") => json!({ "jsonrpc": "2.0", "id": id, "error": {
                    "code": -32001, "message": "Token expirado"
                }}),
                _ => json!({ "jsonrpc": "2.0", "id": id, "result": {
                    "content": [{ "type": "text", "text": format!("echo {}", req["params"]["arguments"]) }]
                }}),
            },
            _ => json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "method not found" } }),
        };

        if method == "initialize" {
            ([("mcp-session-id", "sess-1")], Json(envelope)).into_response()
        } else {
            Json(envelope).into_response()
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/mcp")
    }

    fn sse(messages: &[Value]) -> Response {
        let body: String = messages
            .iter()
            .map(|m| format!("event: message\ndata: {m}\n\n"))
            .collect();
        ([("content-type", "text/event-stream")], body).into_response()
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(401, "Invalid Token".into()).is_auth_failure());
        assert!(classify_status(400, "Bad Request".into()).is_auth_failure());
        assert!(!classify_status(500, "oops".into()).is_auth_failure());
        assert!(!classify_status(404, "missing".into()).is_auth_failure());
    }

    #[test]
    fn rpc_error_mentioning_token_is_auth_failure() {
        assert!(classify_rpc_error(-32001, "Token expirado").is_auth_failure());
        assert!(matches!(
            classify_rpc_error(-32603, "db down"),
            EndpointError::Rpc { code: -32603, .. }
        ));
    }

    #[tokio::test]
    async fn calls_before_connect_fail() {
        let endpoint = McpHttpEndpoint::new("http://127.0.0.1:9/mcp");
        assert!(matches!(
            endpoint.list_tools().await,
            Err(EndpointError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn rejected_credential_is_classified() {
        let url = serve(Router::new().route("/mcp", post(mock_mcp))).await;
        let endpoint = McpHttpEndpoint::new(url);

        let err = endpoint.connect("expired").await.unwrap_err();
        assert!(err.is_auth_failure(), "got {err:?}");
    }

    #[tokio::test]
    async fn session_lists_all_pages_and_calls_tools() {
        let url = serve(Router::new().route("/mcp", post(mock_mcp))).await;
        let endpoint = McpHttpEndpoint::new(url);
        endpoint.connect(GOOD_TOKEN).await.unwrap();

        let tools = endpoint.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["estado_vehiculo", "Enviar_Mensaje_WhatsApp"]);
        assert_eq!(tools[0].description.as_deref(), Some("Vehicle status"));

        let out = endpoint
            .call_tool("estado_vehiculo", json!({ "placa": "ABC123" }))
            .await
            .unwrap();
        assert!(out.text().contains("ABC123"));

        match endpoint.call_tool("fails", json!({})).await {
            Err(EndpointError::ToolFailed { tool_name, reason }) => {
                assert_eq!(tool_name, "fails");
                assert_eq!(reason, "plate not found");
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }

        assert!(matches!(
            endpoint.call_tool("explodes", json!({})).await,
            Err(EndpointError::Rpc { code: -32603, .. })
        ));
        assert!(
            endpoint
                .call_tool("expires", json!({}))
                .await
                .unwrap_err()
                .is_auth_failure()
        );
    }

    #[tokio::test]
    async fn non_object_arguments_are_refused() {
        let url = serve(Router::new().route("/mcp", post(mock_mcp))).await;
        let endpoint = McpHttpEndpoint::new(url);
        endpoint.connect(GOOD_TOKEN).await.unwrap();

        assert!(matches!(
            endpoint.call_tool("estado_vehiculo", json!(["ABC123"])).await,
            Err(EndpointError::ToolFailed { .. })
        ));
    }

    #[tokio::test]
    async fn event_stream_responses_are_understood() {
        async fn streaming(Json(req): Json<Value>) -> Response {
            let Some(id) = req.get("id").cloned() else {
                return StatusCode::ACCEPTED.into_response();
            };
            let result = if req["method"] == "initialize" {
                initialize_result("sse")
            } else {
                json!({ "content": [{ "type": "text", "text": "streamed" }] })
            };
            sse(&[json!({ "jsonrpc": "2.0", "id": id, "result": result })])
        }

        let url = serve(Router::new().route("/mcp", post(streaming))).await;
        let endpoint = McpHttpEndpoint::new(url);
        endpoint.connect("any").await.unwrap();

        let out = endpoint.call_tool("x", json!({})).await.unwrap();
        assert_eq!(out.text(), "streamed");
    }

    #[tokio::test]
    async fn server_ping_inside_a_tool_stream_is_answered() {
        type Replies = Arc<Mutex<Vec<Value>>>;

        async fn pinging(State(replies): State<Replies>, Json(req): Json<Value>) -> Response {
            if req.get("method").is_none() {
                replies.lock().unwrap().push(req);
                return StatusCode::ACCEPTED.into_response();
            }
            let Some(id) = req.get("id").cloned() else {
                return StatusCode::ACCEPTED.into_response();
            };
            if req["method"] == "initialize" {
                return Json(json!({ "jsonrpc": "2.0", "id": id, "result": initialize_result("pinger") }))
                    .into_response();
            }
            sse(&[
                json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" }),
                json!({ "jsonrpc": "2.0", "id": id, "result": {
                    "content": [{ "type": "text", "text": "done" }]
                }}),
            ])
        }

        let replies: Replies = Arc::default();
        let url = serve(
            Router::new()
                .route("/mcp", post(pinging))
                .with_state(replies.clone()),
        )
        .await;
        let endpoint = McpHttpEndpoint::new(url);
        endpoint.connect("any").await.unwrap();

        let out = endpoint.call_tool("x", json!({})).await.unwrap();
        assert_eq!(out.text(), "done");

        for _ in 0..50 {
            if !replies.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1, "ping was never answered");
        assert_eq!(replies[0]["id"], "srv-1");
        assert!(replies[0].get("result").is_some());
    }
}
