use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kynhood_mcp_runtime::config::{RuntimeArgs, RuntimeConfig};
use kynhood_mcp_runtime::{McpCommands, run};

#[derive(Parser)]
#[command(
    name = "kynhood-mcp",
    version,
    about = "Kynhood events MCP server: listEvents and getEventById over stdio"
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(cli.runtime.debug);

    let config = match RuntimeConfig::from_args(&cli.runtime) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            eprintln!(
                "{}",
                serde_json::json!({ "error": "config_error", "message": err.to_string() })
            );
            std::process::exit(1);
        }
    };

    let code = run(config, cli.command.unwrap_or(McpCommands::Serve)).await;
    std::process::exit(code);
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}
