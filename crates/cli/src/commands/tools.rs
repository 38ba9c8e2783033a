//! `lunabridge tools`: list the endpoint's tools as the model sees them.

use lunabridge_config::BridgeConfig;

use crate::runtime::Bridge;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let bridge = Bridge::build(config);

    let tools = bridge.connector.connect().await?;

    println!("🔧 {} tool(s) at {}", tools.len(), bridge.config.mcp_url);
    for tool in &tools {
        println!();
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        println!("    parameters: {}", tool.parameters);
    }
    Ok(())
}
