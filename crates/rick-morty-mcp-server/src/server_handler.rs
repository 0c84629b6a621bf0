use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler};
use tracing::debug;

use crate::errors::McpError;
use crate::tools::ToolRegistry;

/// Name the server reports to MCP clients
pub const SERVER_NAME: &str = "rick-morty-graphql";

#[derive(Clone, Debug)]
pub struct RickMortyServerHandler {
    registry: Arc<ToolRegistry>,
}

impl RickMortyServerHandler {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

impl ServerHandler for RickMortyServerHandler {
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = request.name.clone();
        let result = self.registry.call(request).await;
        debug!(%tool, ok = result.is_ok(), "Tool call finished");
        result
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            next_cursor: None,
            tools: self.registry.tools(),
        })
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Look up Rick and Morty characters and episodes by numeric ID.".to_string(),
            ),
            ..Default::default()
        }
    }
}
