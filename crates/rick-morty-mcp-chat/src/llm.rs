//! Chat completions client for OpenAI compatible APIs such as Groq.

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::config::AgentConfig;
use crate::errors::LlmError;
use types::{ChatMessage, ChatRequest, ChatResponse, ToolDefinition};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A model that continues a conversation, possibly by requesting tool calls
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: Url,
    model: String,
    api_key: SecretString,
}

impl LlmClient {
    pub fn new(config: &AgentConfig, api_key: SecretString) -> Result<Self, LlmError> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting completion"
        );
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&ChatRequest {
                model: &self.model,
                messages,
                tools,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|err| {
            LlmError::InvalidResponse(format!("Failed to parse response: {err}\nBody: {body}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(LlmError::EmptyResponse)
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
