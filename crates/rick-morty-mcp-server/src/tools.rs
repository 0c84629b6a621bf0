//! MCP tools that look up Rick and Morty data through the public GraphQL API.

pub mod character;
pub mod episode;

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, ErrorCode, JsonObject, Tool};
use serde_json::Value;
use tracing::debug;

use crate::errors::{McpError, ServerError};
use crate::graphql;
use character::GetCharacter;
use episode::GetEpisode;

/// A tool backed by a GraphQL query
#[async_trait]
pub trait GraphQLTool: Send + Sync {
    /// The MCP definition advertised to clients
    fn tool(&self) -> &Tool;

    /// Run the tool with the raw arguments from an MCP call
    async fn call(&self, arguments: Option<JsonObject>) -> Result<CallToolResult, McpError>;
}

/// Tools by name, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn GraphQLTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// The `get_character` and `get_episode` tools, sharing one GraphQL client
    pub fn rick_and_morty(client: graphql::Client) -> Result<Self, ServerError> {
        let mut registry = Self::default();
        registry.register(GetCharacter::new(client.clone()))?;
        registry.register(GetEpisode::new(client))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: impl GraphQLTool + 'static) -> Result<(), ServerError> {
        let name = tool.tool().name.to_string();
        if self.get(&name).is_some() {
            return Err(ServerError::DuplicateTool(name));
        }
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn GraphQLTool> {
        self.tools
            .iter()
            .find(|tool| tool.tool().name == name)
            .map(AsRef::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|tool| tool.tool().name.as_ref())
            .collect()
    }

    /// Definitions of every registered tool
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|tool| tool.tool().clone()).collect()
    }

    /// Dispatch an MCP call to the tool it names
    pub async fn call(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        debug!(tool = %request.name, arguments = ?request.arguments, "Calling tool");
        self.get(&request.name)
            .ok_or_else(|| tool_not_found(&request.name))?
            .call(request.arguments)
            .await
    }
}

pub(crate) fn tool_not_found(name: &str) -> McpError {
    McpError::new(
        ErrorCode::METHOD_NOT_FOUND,
        format!("Tool {name} not found"),
        None,
    )
}

pub(crate) fn convert_arguments<T: serde::de::DeserializeOwned>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    serde_json::from_value(Value::from(arguments))
        .map_err(|_| McpError::new(ErrorCode::INVALID_PARAMS, "Invalid input".to_string(), None))
}

/// Read a string field, treating absent and null alike
pub(crate) fn field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

#[cfg(test)]
pub(crate) fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| match &content.raw {
            rmcp::model::RawContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}
