//! Sessions with the configured MCP servers
//!
//! Every server in the config gets one running rmcp client. Tools from all of
//! them are offered together and each call is routed to the server that
//! advertised the tool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    JsonObject, RawContent, Tool,
};
use rmcp::service::RunningService;
use rmcp::transport::{SseClientTransport, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt as _};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::ToolExecutor;
use crate::config::{McpServerConfig, RemoteTransport};
use crate::errors::SessionError;
use crate::llm::types::ToolDefinition;

pub type McpService = RunningService<RoleClient, ClientInfo>;

struct Session {
    service: McpService,
    tools: Vec<Tool>,
}

/// Running sessions by server name
#[derive(Default)]
pub struct McpClient {
    sessions: BTreeMap<String, Session>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    }
}

impl McpClient {
    /// Connect to every configured server. Sessions opened before a failure are closed again.
    pub async fn create_all_sessions(
        servers: &BTreeMap<String, McpServerConfig>,
    ) -> Result<Self, SessionError> {
        let mut client = Self::default();
        for (name, server) in servers {
            let connected = match connect(name, server).await {
                Ok(service) => client.add_session(name, service).await,
                Err(e) => Err(e),
            };
            if let Err(e) = connected {
                client.close_all_sessions().await;
                return Err(e);
            }
        }
        Ok(client)
    }

    /// Track a connected service under `name`, fetching its tools
    pub async fn add_session(
        &mut self,
        name: &str,
        service: McpService,
    ) -> Result<(), SessionError> {
        let tools = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = service.cancel().await;
                return Err(SessionError::ListTools {
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        };
        info!(server = %name, tools = tools.len(), "Connected to MCP server");
        self.sessions
            .insert(name.to_string(), Session { service, tools });
        Ok(())
    }

    /// Names of the servers with an open session
    pub fn sessions(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }

    /// Tools of every session, in server name order
    pub fn list_tools(&self) -> Vec<&Tool> {
        self.sessions
            .values()
            .flat_map(|session| session.tools.iter())
            .collect()
    }

    /// Call a tool on the server that offers it, returning its text content
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<String, SessionError> {
        let session = self
            .sessions
            .values()
            .find(|session| session.tools.iter().any(|tool| tool.name == name))
            .ok_or_else(|| SessionError::UnknownTool(name.to_string()))?;

        let result = session
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| SessionError::Call {
                tool: name.to_string(),
                message: e.to_string(),
            })?;

        let text = result_text(&result);
        if result.is_error == Some(true) {
            return Err(SessionError::Call {
                tool: name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    /// Cancel every session. Failures are logged and the client is left empty.
    pub async fn close_all_sessions(&mut self) {
        for (name, session) in std::mem::take(&mut self.sessions) {
            match session.service.cancel().await {
                Ok(reason) => debug!(server = %name, ?reason, "Closed MCP session"),
                Err(e) => warn!(server = %name, error = %e, "Failed to close MCP session"),
            }
        }
    }
}

async fn connect(name: &str, server: &McpServerConfig) -> Result<McpService, SessionError> {
    let connect_error = |e: String| SessionError::Connect {
        name: name.to_string(),
        message: e,
    };

    match server {
        McpServerConfig::Command { command, args, env } => {
            debug!(server = %name, %command, ?args, "Starting MCP server process");
            let mut process = tokio::process::Command::new(command);
            process.args(args).envs(env);
            let spawn_error = |source| SessionError::Spawn {
                name: name.to_string(),
                source,
            };
            let transport = TokioChildProcess::new(process).map_err(spawn_error)?;
            client_info()
                .serve(transport)
                .await
                .map_err(|e| connect_error(e.to_string()))
        }
        McpServerConfig::Url { url, transport } => {
            match RemoteTransport::for_url(url, *transport) {
                RemoteTransport::Sse => {
                    debug!(server = %name, %url, "Connecting over SSE");
                    let transport = SseClientTransport::start(url.as_str())
                        .await
                        .map_err(|e| connect_error(e.to_string()))?;
                    client_info()
                        .serve(transport)
                        .await
                        .map_err(|e| connect_error(e.to_string()))
                }
                RemoteTransport::StreamableHttp => {
                    debug!(server = %name, %url, "Connecting over streamable HTTP");
                    client_info()
                        .serve(StreamableHttpClientTransport::from_uri(url.as_str()))
                        .await
                        .map_err(|e| connect_error(e.to_string()))
                }
            }
        }
    }
}

fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| match &content.raw {
            RawContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolExecutor for McpClient {
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.list_tools()
            .into_iter()
            .map(|tool| {
                ToolDefinition::function(
                    tool.name.to_string(),
                    tool.description.as_ref().map(ToString::to_string),
                    Value::Object(tool.input_schema.as_ref().clone()),
                )
            })
            .collect()
    }

    async fn execute(&self, name: &str, arguments: &str) -> Result<String, SessionError> {
        let arguments = match arguments.trim() {
            "" => None,
            json => match serde_json::from_str::<JsonObject>(json) {
                Ok(arguments) => Some(arguments),
                Err(e) => {
                    return Err(SessionError::InvalidArguments {
                        tool: name.to_string(),
                        message: e.to_string(),
                    });
                }
            },
        };
        self.call_tool(name, arguments).await
    }
}
