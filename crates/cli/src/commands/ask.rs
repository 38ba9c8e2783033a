//! `lunabridge ask`: run one command turn from the terminal.

use lunabridge_agent::Outcome;
use lunabridge_config::BridgeConfig;
use lunabridge_core::channel::InboundEvent;
use tracing::warn;

use crate::runtime::Bridge;

pub async fn run(message: String, to: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let bridge = Bridge::build(config);
    let _event_log = bridge.spawn_event_log();

    if let Err(e) = bridge.connector.connect().await {
        warn!(error = %e, "Continuing without tools");
    }

    let body = format!("{} {}", bridge.config.agent.command_prefix, message);
    let id = format!("ask-{}", chrono::Utc::now().timestamp_millis());
    let event = InboundEvent::chat(body, &to, id, &to);

    match bridge.dispatcher.handle(event).await {
        Outcome::Completed(turn) => {
            println!("  Model calls: {}", turn.model_calls);
            if let Some(response) = turn.last_response {
                if !response.message.content.is_empty() {
                    println!("  Luna > {}", response.message.content);
                }
            }
            Ok(())
        }
        Outcome::Ignored => Err("Message was not recognised as a command".into()),
        Outcome::Failed(e) => Err(format!("Turn failed: {e}").into()),
    }
}
