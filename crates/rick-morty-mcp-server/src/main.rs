use std::path::PathBuf;

use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use rick_morty_mcp_server::graphql;
use rick_morty_mcp_server::server::Server;
use rick_morty_mcp_server::tools::ToolRegistry;
use runtime::Config;
use tracing::info;

mod runtime;

/// Clap styling
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// Arguments to the MCP server
#[derive(Debug, clap::Parser)]
#[command(
    version,
    styles = STYLES,
    about = "Rick and Morty MCP Server - look up characters and episodes from an AI agent",
)]
struct Args {
    /// Path to the config file
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: Config = match Args::parse().config {
        Some(config_path) => runtime::read_config(config_path)?,
        None => runtime::read_config_from_env()?,
    };

    let _guard = config.logging.setup()?;

    info!(
        "Rick and Morty MCP Server v{}",
        std::env!("CARGO_PKG_VERSION")
    );

    let client = graphql::Client::new(config.endpoint.into_inner(), config.headers)?;
    info!(endpoint = %client.endpoint(), "Using GraphQL endpoint");

    Ok(Server::builder()
        .transport(config.transport)
        .registry(ToolRegistry::rick_and_morty(client)?)
        .build()
        .start()
        .await?)
}
