use std::path::PathBuf;

use clap::Parser;
use rick_morty_mcp_chat::agent::McpAgent;
use rick_morty_mcp_chat::client::McpClient;
use rick_morty_mcp_chat::config::{DEFAULT_CONFIG_PATH, read_config};
use rick_morty_mcp_chat::llm::LlmClient;
use rick_morty_mcp_chat::session::{converse, shutdown_signal, stdin_lines};
use tracing::info;

/// Arguments to the chat client
#[derive(Debug, clap::Parser)]
#[command(
    version,
    about = "Chat with an LLM that can look up Rick and Morty characters and episodes over MCP"
)]
struct Args {
    /// Path to the JSON file listing MCP servers
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("Initializing chat with Rick and Morty GraphQL tools...");

    let config = read_config(&args.config)?;
    let _guard = config.logging.setup()?;
    let model = LlmClient::new(&config.agent, config.api_key()?)?;
    let client = McpClient::create_all_sessions(&config.mcp_servers).await?;
    info!(sessions = ?client.sessions(), "MCP sessions ready");

    let agent = McpAgent::new(model, client, &config.agent);
    converse(agent, stdin_lines(), tokio::io::stdout(), shutdown_signal()).await?;
    Ok(())
}
