use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bon::bon;
use rmcp::ServiceExt as _;
use rmcp::transport::sse_server::SseServerConfig;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{SseServer, StreamableHttpService, stdio};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::ServerError;
use crate::server_handler::RickMortyServerHandler;
use crate::tools::ToolRegistry;

/// A Rick and Morty MCP Server
pub struct Server {
    transport: Transport,
    registry: ToolRegistry,
}

/// How the server is exposed to MCP clients
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin and stdout
    Stdio,

    /// Server-sent events on `/sse`, with client messages posted to `/message`
    #[serde(rename = "sse")]
    SSE {
        #[serde(default = "defaults::address")]
        address: IpAddr,
        #[serde(default = "defaults::port")]
        port: u16,
    },

    /// Streamable HTTP on `/mcp`
    StreamableHttp {
        #[serde(default = "defaults::address")]
        address: IpAddr,
        #[serde(default = "defaults::port")]
        port: u16,
    },
}

impl Default for Transport {
    fn default() -> Self {
        Self::SSE {
            address: defaults::address(),
            port: defaults::port(),
        }
    }
}

mod defaults {
    use super::*;

    pub(super) fn address() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    pub(super) const fn port() -> u16 {
        8001
    }
}

#[bon]
impl Server {
    #[builder]
    pub fn new(transport: Transport, registry: ToolRegistry) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Serve until the client disconnects (stdio) or a shutdown signal arrives
    pub async fn start(self) -> Result<(), ServerError> {
        let handler = RickMortyServerHandler::new(self.registry);
        match self.transport {
            Transport::Stdio => {
                info!("Starting MCP server in stdio mode");
                let service = handler.serve(stdio()).await.map_err(|e| {
                    error!("serving error: {:?}", e);
                    ServerError::McpInitialize(e.to_string())
                })?;
                service.waiting().await?;
            }
            Transport::SSE { address, port } => {
                info!(port = ?port, address = ?address, "Starting MCP server in SSE mode");
                let cancellation_token = SseServer::serve_with_config(SseServerConfig {
                    bind: SocketAddr::new(address, port),
                    sse_path: "/sse".to_string(),
                    post_path: "/message".to_string(),
                    ct: CancellationToken::new(),
                    sse_keep_alive: None,
                })
                .await?
                .with_service(move || handler.clone());

                shutdown_signal().await;
                cancellation_token.cancel();
            }
            Transport::StreamableHttp { address, port } => {
                info!(
                    port = ?port,
                    address = ?address,
                    "Starting MCP server in Streamable HTTP mode"
                );
                let service = StreamableHttpService::new(
                    move || Ok(handler.clone()),
                    LocalSessionManager::default().into(),
                    Default::default(),
                );
                let router = axum::Router::new().nest_service("/mcp", service);
                let address = SocketAddr::new(address, port);
                let listener = tokio::net::TcpListener::bind(address).await?;
                axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
            }
        }
        info!("MCP server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix. A handler that cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C signal handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
