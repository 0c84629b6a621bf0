use std::path::PathBuf;

/// A problem with the chat configuration, reported before the session starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Figment(#[from] figment::Error),

    #[error("Missing environment variable: GROQ_API_KEY")]
    MissingApiKey,

    #[error("No MCP servers configured under mcpServers")]
    NoServers,
}

/// An error talking to a connected MCP server
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to start MCP server {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to MCP server {name}: {message}")]
    Connect { name: String, message: String },

    #[error("Failed to list tools of MCP server {name}: {message}")]
    ListTools { name: String, message: String },

    #[error("Tool {0} not found")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool {tool} failed: {message}")]
    Call { tool: String, message: String },
}

/// An error from the chat completions API
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM response contained no choices")]
    EmptyResponse,
}

/// An error that ends one agent turn
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Model replied with a {0} message instead of an assistant message")]
    UnexpectedMessage(&'static str),

    #[error("Agent stopped after reaching the maximum of {0} steps")]
    MaxSteps(usize),
}
