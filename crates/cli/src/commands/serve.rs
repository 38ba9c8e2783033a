//! `lunabridge serve`: the long-running bridge.

use lunabridge_channels::{ConsoleSource, WebhookListener, WebhookSettings};
use lunabridge_config::BridgeConfig;
use lunabridge_core::channel::Channel;
use tracing::{info, warn};

use crate::runtime::Bridge;

pub async fn run(console: bool, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(port) = port {
        config.webhook.port = port;
    }
    if !config.has_api_key() {
        warn!("GEMINI_API_KEY is not set; every command will get the fallback notice");
    }

    let bridge = Bridge::build(config);
    let _event_log = bridge.spawn_event_log();

    println!("🌙 Luna bridge starting");
    println!("   Model:     {}", bridge.config.agent.model);
    println!("   Prefix:    {}", bridge.config.agent.command_prefix);
    println!("   Endpoint:  {}", bridge.config.mcp_url);

    // Commands arriving before the endpoint answers run with no tools.
    let _connect = bridge.connector.clone().spawn_background_connect();

    let channel: Box<dyn Channel> = if console {
        println!("   Inbound:   console (type `{} <text>`)", bridge.config.agent.command_prefix);
        Box::new(ConsoleSource::default())
    } else {
        let settings = WebhookSettings {
            host: bridge.config.webhook.host.clone(),
            port: bridge.config.webhook.port,
            secret: bridge.config.webhook.secret.clone(),
        };
        println!("   Inbound:   http://{}:{}/events", settings.host, settings.port);
        println!("   Upstream:  {}", bridge.config.transport_url);
        Box::new(WebhookListener::new(settings))
    };

    let rx = channel
        .start()
        .await
        .map_err(|e| format!("Channel error: {e}"))?;
    info!(channel = channel.name(), "Listening for commands");

    tokio::select! {
        _ = bridge.dispatcher.clone().run(rx) => info!("Inbound stream ended"),
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    channel.stop().await?;
    Ok(())
}
