//! Chat client configuration
//!
//! The JSON file lists the MCP servers to connect to under `mcpServers`, in
//! the format used by common MCP hosts, plus optional `agent` and `logging`
//! sections. Environment variables prefixed `MCP_CHAT_` override file values
//! and `GROQ_API_KEY` supplies the LLM credential.

use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Json},
};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::errors::ConfigError;
use crate::logging::Logging;

/// Where the config is read from when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "graphqlserver/graphql.json";

const ENV_PREFIX: &str = "MCP_CHAT_";

/// Separator to use when drilling down into nested options in the env figment
const ENV_NESTED_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize)]
pub struct Config {
    /// MCP servers by name
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn api_key(&self) -> Result<SecretString, ConfigError> {
        self.agent.api_key.clone().ok_or(ConfigError::MissingApiKey)
    }
}

/// How to reach one MCP server
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum McpServerConfig {
    /// Spawn a child process and talk to it over stdio
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },

    /// Connect to a running server over HTTP
    Url {
        url: Url,
        #[serde(default)]
        transport: Option<RemoteTransport>,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTransport {
    Sse,
    StreamableHttp,
}

impl RemoteTransport {
    /// The explicit transport, else SSE for URLs ending in `/sse`
    pub fn for_url(url: &Url, explicit: Option<Self>) -> Self {
        explicit.unwrap_or_else(|| {
            if url.path().trim_end_matches('/').ends_with("/sse") {
                Self::Sse
            } else {
                Self::StreamableHttp
            }
        })
    }
}

/// LLM and agent loop settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,

    /// Base of an OpenAI compatible API
    pub base_url: Url,

    /// Model calls allowed per user message
    pub max_steps: usize,

    /// Keep earlier turns in the conversation sent to the model
    pub memory_enabled: bool,

    pub system_prompt: String,

    pub api_key: Option<SecretString>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: defaults::MODEL.to_string(),
            base_url: defaults::base_url(),
            max_steps: defaults::MAX_STEPS,
            memory_enabled: true,
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            api_key: None,
        }
    }
}

mod defaults {
    use url::Url;

    pub(super) const MODEL: &str = "qwen/qwen3-32b";
    pub(super) const MAX_STEPS: usize = 15;
    pub(super) const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
        about Rick and Morty. Use the available tools to look up characters and episodes by ID \
        whenever a question needs data from the show.";

    pub(super) fn base_url() -> Url {
        // SAFETY: constant input, covered by [test::default_base_url_parses]
        #[allow(clippy::unwrap_used)]
        Url::parse("https://api.groq.com/openai/v1").unwrap()
    }

}

/// Read the config file, with env overrides and the API key from the environment
#[allow(clippy::result_large_err)]
pub fn read_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }

    let config: Config = Figment::new()
        .join(api_key_env())
        .join(Env::prefixed(ENV_PREFIX).split(ENV_NESTED_SEPARATOR))
        .join(Json::file(path))
        .extract()?;

    if config.mcp_servers.is_empty() {
        return Err(ConfigError::NoServers);
    }
    Ok(config)
}

/// Figment provider mapping `GROQ_API_KEY` onto `agent.api_key`
fn api_key_env() -> Env {
    Env::raw()
        .only(&["GROQ_API_KEY"])
        .map(|_| "AGENT:API_KEY".into())
        .split(":")
}
