//! Luna bridge CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Listen for chat events and answer `/luna` commands
//! - `tools`: Connect to the tool endpoint and list its tools
//! - `ask`: Run one command turn from the terminal
//! - `doctor`: Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "lunabridge",
    about = "Luna bridge: chat commands answered by Gemini with MCP tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LUNABRIDGE_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge
    Serve {
        /// Read commands from stdin instead of the webhook listener
        #[arg(long)]
        console: bool,

        /// Override the webhook port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the tools the endpoint publishes
    Tools,

    /// Run a single command turn
    Ask {
        /// Command text, without the prefix
        message: String,

        /// Recipient number passed to the model
        #[arg(long, default_value = "local_user")]
        to: String,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { console, port } => commands::serve::run(console, port).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Ask { message, to } => commands::ask::run(message, to).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
