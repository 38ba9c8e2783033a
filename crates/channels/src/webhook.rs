//! Webhook listener.
//!
//! Accepts inbound chat events as JSON over HTTP and feeds them into the
//! event stream. When a shared secret is configured every request must carry
//! an `x-signature` header holding the hex HMAC-SHA256 of the raw body.
//!
//! Routes:
//! - `POST /events`: one [`InboundEvent`]; answers `202 Accepted`
//! - `GET /health`: liveness probe

use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use lunabridge_core::channel::{Channel, InboundEvent};
use lunabridge_core::error::ChannelError;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub host: String,
    pub port: u16,
    /// HMAC shared secret. `None` or empty disables validation.
    pub secret: Option<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3100,
            secret: None,
        }
    }
}

#[derive(Clone)]
struct ListenerState {
    tx: mpsc::Sender<Result<InboundEvent, ChannelError>>,
    secret: Option<String>,
}

/// Inbound HTTP source of chat events.
pub struct WebhookListener {
    settings: WebhookSettings,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl WebhookListener {
    pub fn new(settings: WebhookSettings) -> Self {
        Self {
            settings,
            shutdown: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// The bound address once `start()` has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Build the HTTP router that pushes accepted events into `tx`.
    pub fn router(&self, tx: mpsc::Sender<Result<InboundEvent, ChannelError>>) -> Router {
        let state = ListenerState {
            tx,
            secret: self.settings.secret.clone().filter(|s| !s.is_empty()),
        };

        Router::new()
            .route("/events", post(receive_event))
            .route("/health", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

#[async_trait]
impl Channel for WebhookListener {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundEvent, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(64);
        let router = self.router(tx);

        let bind = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| ChannelError::NotConfigured(format!("cannot bind {bind}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ChannelError::NotConfigured(e.to_string()))?;
        *self.local_addr.lock().unwrap_or_else(|p| p.into_inner()) = Some(addr);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        *self.shutdown.lock().unwrap_or_else(|p| p.into_inner()) = Some(stop_tx);

        info!(%addr, signed = self.settings.secret.is_some(), "Webhook listener started");
        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = stop_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "Webhook listener stopped with error");
            }
        });

        Ok(rx)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        if let Some(stop) = self.shutdown.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = stop.send(());
            info!("Webhook listener stopping");
        }
        Ok(())
    }
}

async fn receive_event(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!("Rejected webhook event with bad signature");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let event: InboundEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Unparseable webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if state.tx.send(Ok(event)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

/// Check a hex HMAC-SHA256 digest (optionally `sha256=`-prefixed).
///
/// The comparison is constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(provided) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn sign(secret: &str, payload: &[u8]) -> String {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn post_event(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/events").header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    const EVENT: &str = r#"{"body":"/luna hola","type":"chat","number":573001112233,"id":"wamid.1","from":"573001112233@c.us","hasQuotedMsg":false}"#;

    #[tokio::test]
    async fn accepted_event_reaches_stream() {
        let listener = WebhookListener::new(WebhookSettings::default());
        let (tx, mut rx) = mpsc::channel(4);

        let response = listener
            .router(tx)
            .oneshot(post_event(EVENT, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let event = rx.recv().await.unwrap().unwrap();
        assert_eq!(event.body, "/luna hola");
        assert_eq!(event.number, "573001112233");
        assert_eq!(event.kind, "chat");
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let listener = WebhookListener::new(WebhookSettings::default());
        let (tx, _rx) = mpsc::channel(4);
        let response = listener
            .router(tx)
            .oneshot(post_event("not json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_is_enforced_when_secret_set() {
        let listener = WebhookListener::new(WebhookSettings {
            secret: Some("s3cret".into()),
            ..WebhookSettings::default()
        });
        let (tx, mut rx) = mpsc::channel(4);
        let router = listener.router(tx);

        let unsigned = router.clone().oneshot(post_event(EVENT, None)).await.unwrap();
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

        let forged = router
            .clone()
            .oneshot(post_event(EVENT, Some(&sign("other", EVENT.as_bytes()))))
            .await
            .unwrap();
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let signed = router
            .oneshot(post_event(EVENT, Some(&sign("s3cret", EVENT.as_bytes()))))
            .await
            .unwrap();
        assert_eq!(signed.status(), StatusCode::ACCEPTED);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn health_route() {
        let listener = WebhookListener::new(WebhookSettings::default());
        let (tx, _rx) = mpsc::channel(1);
        let response = listener
            .router(tx)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_binds_and_stop_releases() {
        let listener = WebhookListener::new(WebhookSettings {
            port: 0,
            ..WebhookSettings::default()
        });
        let _rx = listener.start().await.unwrap();
        assert!(listener.local_addr().is_some_and(|a| a.port() != 0));
        listener.stop().await.unwrap();
    }

    #[test]
    fn bad_hex_never_verifies() {
        assert!(!verify_signature("k", b"payload", "zz-not-hex"));
    }
}
