//! Configuration loading, validation, and management for the Luna bridge.
//!
//! Loads configuration from `~/.lunabridge/config.toml` (optional), then
//! applies environment variable overrides. Every field has a literal
//! fallback so the bridge starts with no configuration at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default system instruction for the model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres Luna. Tienes acceso a herramientas. \
Para responder al usuario, DEBES usar OBLIGATORIAMENTE la herramienta \
'Enviar_Mensaje_WhatsApp' con tu respuesta final. El número del usuario activo \
se te proveerá en el prompt inicial.\n\n\
Cuando la respuesta sea sobre el estado de un vehículo, FORMATEA tu respuesta \
con la siguiente estructura por cada placa, usando negritas (*texto*) y emojis:\n\n\
🚗 *Placa:* [NÚMERO_DE_PLACA]\n\
📊 *Estado:* [Ej: Activo, En movimiento, etc.]\n\
🕒 *Último Reporte:* [Fecha y hora o ubicación del último reporte registrado]\n\
🌡️ *Temperatura:* [Si registras temperatura inclúyela aquí, de lo contrario omite la fila]\n\n\
Responde directamente con la información sin frases introductorias largas.";

/// The root configuration structure.
///
/// Maps directly to `~/.lunabridge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Upstream real-time chat transport. Nothing connects to it: events
    /// arrive through the webhook listener, which fronts this transport.
    /// Kept so `serve` can report which upstream the webhook expects.
    #[serde(default = "default_transport_url")]
    pub transport_url: String,

    /// Direct send endpoint used for the fallback notice
    #[serde(default = "default_send_url")]
    pub send_url: String,

    /// Tool-execution (MCP) endpoint
    #[serde(default = "default_mcp_url")]
    pub mcp_url: String,

    /// Login endpoint that issues bearer tokens
    #[serde(default = "default_login_url")]
    pub login_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_password: Option<String>,

    /// Token used until the first successful login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_token: Option<String>,

    /// Gemini API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    /// Gemini REST base URL
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Orchestration settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool endpoint session settings
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Inbound webhook listener settings
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_transport_url() -> String {
    "https://wha.oberon360.com/".into()
}
fn default_send_url() -> String {
    "https://wha.oberon360.com/api/wha/send".into()
}
fn default_mcp_url() -> String {
    "http://localhost:3001/mcp".into()
}
fn default_login_url() -> String {
    "https://api.oberon360.com/api/core/auth/login".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("transport_url", &self.transport_url)
            .field("send_url", &self.send_url)
            .field("mcp_url", &self.mcp_url)
            .field("login_url", &self.login_url)
            .field("login_user", &self.login_user)
            .field("login_password", &redact(&self.login_password))
            .field("seed_token", &redact(&self.seed_token))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("gemini_base_url", &self.gemini_base_url)
            .field("agent", &self.agent)
            .field("connector", &self.connector)
            .field("webhook", &self.webhook)
            .finish()
    }
}

/// How the loop treats a model response carrying several function calls.
///
/// The default, `All`, is a behaviour change from acting on the first call
/// only: every call the model asked for is executed and answered. Set
/// `pending_calls = "first_only"` to restore the single-call behaviour;
/// the ignored calls are then logged as a warning, never dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCallPolicy {
    /// Execute every pending call in order and answer them in one turn.
    #[default]
    All,
    /// Execute only the first pending call; the rest are logged and dropped.
    FirstOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Case-insensitive command prefix, without the trailing space
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Tool the model must use to deliver its answer
    #[serde(default = "default_reply_tool")]
    pub reply_tool: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Text sent directly to the sender when a turn fails
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub pending_calls: PendingCallPolicy,
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_command_prefix() -> String {
    "/luna".into()
}
fn default_reply_tool() -> String {
    "Enviar_Mensaje_WhatsApp".into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_fallback_message() -> String {
    "Hubo un error al procesar tu solicitud con /luna.".into()
}
fn default_max_iterations() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            command_prefix: default_command_prefix(),
            reply_tool: default_reply_tool(),
            system_prompt: default_system_prompt(),
            fallback_message: default_fallback_message(),
            max_iterations: default_max_iterations(),
            pending_calls: PendingCallPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Fixed delay between a credential refresh and the reconnect attempt
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Cap on refresh-and-retry cycles. Unset = retry indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_auth_retries: Option<u32>,
}

fn default_retry_delay_secs() -> u64 {
    2
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            max_auth_retries: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// HMAC-SHA256 shared secret for the `x-signature` header. Unset = no check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3100
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret: None,
        }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &redact(&self.secret))
            .finish()
    }
}

impl BridgeConfig {
    /// Load configuration from the default path, then apply the process
    /// environment.
    ///
    /// Recognised variables:
    /// - `WHA_WEBSOCKET_URL`, `WHA_API_SEND_URL`
    /// - `MCP_SERVER_URL`
    /// - `OBERON_LOGIN_URL`, `OBERON_USER`, `OBERON_PASSWORD`
    /// - `GEMINI_API_KEY`
    /// - `LUNABRIDGE_SEED_TOKEN`, `LUNABRIDGE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WHA_WEBSOCKET_URL") {
            self.transport_url = v;
        }
        if let Some(v) = get("WHA_API_SEND_URL") {
            self.send_url = v;
        }
        if let Some(v) = get("MCP_SERVER_URL") {
            self.mcp_url = v;
        }
        if let Some(v) = get("OBERON_LOGIN_URL") {
            self.login_url = v;
        }
        if let Some(v) = get("OBERON_USER") {
            self.login_user = Some(v);
        }
        if let Some(v) = get("OBERON_PASSWORD") {
            self.login_password = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = get("LUNABRIDGE_SEED_TOKEN") {
            self.seed_token = Some(v);
        }
        if let Some(v) = get("LUNABRIDGE_MODEL") {
            self.agent.model = v;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lunabridge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.command_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.command_prefix must not be empty".into(),
            ));
        }

        if let Some(t) = self.agent.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "agent.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Whether a Gemini API key is available.
    pub fn has_api_key(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport_url: default_transport_url(),
            send_url: default_send_url(),
            mcp_url: default_mcp_url(),
            login_url: default_login_url(),
            login_user: None,
            login_password: None,
            seed_token: None,
            gemini_api_key: None,
            gemini_base_url: default_gemini_base_url(),
            agent: AgentConfig::default(),
            connector: ConnectorConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mcp_url, "http://localhost:3001/mcp");
        assert_eq!(config.agent.command_prefix, "/luna");
        assert_eq!(config.connector.retry_delay_secs, 2);
        assert!(config.connector.max_auth_retries.is_none());
        assert_eq!(config.agent.pending_calls, PendingCallPolicy::All);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.send_url, config.send_url);
        assert_eq!(parsed.webhook.port, config.webhook.port);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("MCP_SERVER_URL", "http://tools.internal/mcp"),
            ("OBERON_USER", "operador"),
            ("GEMINI_API_KEY", "key-123"),
            ("WHA_API_SEND_URL", ""),
            ("WHA_WEBSOCKET_URL", "wss://chat.internal/"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.mcp_url, "http://tools.internal/mcp");
        assert_eq!(config.login_user.as_deref(), Some("operador"));
        assert_eq!(config.transport_url, "wss://chat.internal/");
        assert!(config.has_api_key());
        // Empty values keep the fallback
        assert_eq!(config.send_url, default_send_url());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = BridgeConfig::default();
        config.agent.temperature = Some(5.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_prefix_rejected() {
        let mut config = BridgeConfig::default();
        config.agent.command_prefix = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = BridgeConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.model, "gemini-2.5-flash");
    }

    #[test]
    fn loads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
mcp_url = "http://10.0.0.5:3001/mcp"

[agent]
pending_calls = "first_only"
max_iterations = 8

[connector]
max_auth_retries = 3
"#,
        )
        .unwrap();

        let config = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(config.mcp_url, "http://10.0.0.5:3001/mcp");
        assert_eq!(config.agent.pending_calls, PendingCallPolicy::FirstOnly);
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.connector.max_auth_retries, Some(3));
        assert_eq!(config.agent.reply_tool, "Enviar_Mensaje_WhatsApp");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = BridgeConfig::default();
        config.login_password = Some("hunter2".into());
        config.gemini_api_key = Some("AIza-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("AIza-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
