//! `lunabridge doctor`: Diagnose configuration and connectivity.

use lunabridge_config::BridgeConfig;
use lunabridge_core::Provider;
use lunabridge_providers::GeminiProvider;
use lunabridge_security::CredentialState;

use crate::runtime::Bridge;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Luna Bridge Doctor: System Diagnostics");
    println!("==========================================\n");

    let mut issues = 0;

    let mut config = match BridgeConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            return Ok(());
        }
    };

    if config.has_api_key() {
        let gemini = GeminiProvider::with_base_url(
            &config.gemini_base_url,
            config.gemini_api_key.clone().unwrap_or_default(),
        );
        match gemini.health_check().await {
            Ok(true) => println!("  ✅ Gemini API key accepted"),
            Ok(false) => {
                println!("  ❌ Gemini rejected the API key");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Gemini unreachable: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No GEMINI_API_KEY configured");
        issues += 1;
    }

    if config.login_user.is_none() || config.login_password.is_none() {
        println!("  ⚠️  OBERON_USER / OBERON_PASSWORD not set: token refresh will fail");
        issues += 1;
    }

    // One refresh at most; doctor must not retry forever.
    config.connector.max_auth_retries = Some(1);
    let bridge = Bridge::build(config);
    match bridge.connector.connect().await {
        Ok(tools) => println!("  ✅ Tool endpoint connected ({} tools)", tools.len()),
        Err(e) => {
            println!("  ❌ Tool endpoint: {e}");
            issues += 1;
        }
    }
    if bridge.credentials.state() == CredentialState::Unknown {
        println!("  ⚠️  Bearer credential is not currently accepted");
        issues += 1;
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
