//! The tool calling agent
//!
//! One user message runs a loop: ask the model, execute any tool calls it
//! requests, feed the results back, and stop once it answers in plain text.

use async_trait::async_trait;
use tracing::debug;

use crate::config::AgentConfig;
use crate::errors::{AgentError, SessionError};
use crate::llm::ChatModel;
use crate::llm::types::{ChatMessage, ToolDefinition};

/// Something that can answer a user message
#[async_trait]
pub trait Agent: Send {
    async fn run(&mut self, input: &str) -> Result<String, AgentError>;

    /// Forget earlier turns, keeping the system prompt
    fn clear_conversation_history(&mut self);
}

/// Executes the tools offered to the model
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Run `name` with the JSON encoded `arguments` the model produced
    async fn execute(&self, name: &str, arguments: &str) -> Result<String, SessionError>;
}

pub struct McpAgent<M, T> {
    model: M,
    tools: T,
    memory: Vec<ChatMessage>,
    max_steps: usize,
    memory_enabled: bool,
}

impl<M: ChatModel, T: ToolExecutor> McpAgent<M, T> {
    pub fn new(model: M, tools: T, config: &AgentConfig) -> Self {
        Self {
            model,
            tools,
            memory: vec![ChatMessage::system(config.system_prompt.clone())],
            max_steps: config.max_steps,
            memory_enabled: config.memory_enabled,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.memory
    }

    pub fn into_tools(self) -> T {
        self.tools
    }

    async fn steps(&mut self) -> Result<String, AgentError> {
        let definitions = self.tools.tool_definitions();
        for step in 1..=self.max_steps {
            let reply = self.model.complete(&self.memory, &definitions).await?;
            let role = reply.role();
            let ChatMessage::Assistant {
                content,
                tool_calls,
            } = reply
            else {
                return Err(AgentError::UnexpectedMessage(role));
            };

            if tool_calls.is_empty() {
                let answer = content.unwrap_or_default();
                self.memory.push(ChatMessage::assistant(answer.clone()));
                return Ok(answer);
            }

            self.memory.push(ChatMessage::Assistant {
                content,
                tool_calls: tool_calls.clone(),
            });
            for call in tool_calls {
                debug!(
                    step,
                    tool = %call.function.name,
                    arguments = %call.function.arguments,
                    "Calling tool"
                );
                let content = self
                    .tools
                    .execute(&call.function.name, &call.function.arguments)
                    .await
                    .unwrap_or_else(|e| {
                        debug!(tool = %call.function.name, error = %e, "Tool call failed");
                        format!("Error: {e}")
                    });
                self.memory.push(ChatMessage::Tool {
                    tool_call_id: call.id,
                    content,
                });
            }
        }
        Err(AgentError::MaxSteps(self.max_steps))
    }
}

#[async_trait]
impl<M: ChatModel, T: ToolExecutor> Agent for McpAgent<M, T> {
    async fn run(&mut self, input: &str) -> Result<String, AgentError> {
        let checkpoint = self.memory.len();
        self.memory.push(ChatMessage::user(input));

        let result = self.steps().await;
        if result.is_err() || !self.memory_enabled {
            self.memory.truncate(checkpoint);
        }
        result
    }

    fn clear_conversation_history(&mut self) {
        self.memory.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::llm::types::{FunctionCall, ToolCall};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Replays canned replies and records the conversations it was shown
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ChatMessage, LlmError>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: impl IntoIterator<Item = Result<ChatMessage, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                seen: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ChatMessage, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    struct FakeTools;

    #[async_trait]
    impl ToolExecutor for FakeTools {
        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::function(
                "get_character",
                None,
                json!({ "type": "object" }),
            )]
        }

        async fn execute(&self, name: &str, arguments: &str) -> Result<String, SessionError> {
            match name {
                "get_character" => Ok(format!("Name: Rick Sanchez ({arguments})")),
                other => Err(SessionError::UnknownTool(other.to_string())),
            }
        }
    }

    fn tool_call(name: &str) -> ChatMessage {
        ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{name}"),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: r#"{"character_id":1}"#.to_string(),
                },
            }],
        }
    }

    fn agent(
        replies: impl IntoIterator<Item = Result<ChatMessage, LlmError>>,
    ) -> McpAgent<ScriptedModel, FakeTools> {
        McpAgent::new(
            ScriptedModel::new(replies),
            FakeTools,
            &AgentConfig::default(),
        )
    }

    #[tokio::test]
    async fn answers_after_a_tool_round() {
        let mut agent = agent([
            Ok(tool_call("get_character")),
            Ok(ChatMessage::assistant("Character 1 is Rick Sanchez.")),
        ]);

        let answer = agent.run("Who is character 1?").await.unwrap();

        assert_eq!(answer, "Character 1 is Rick Sanchez.");
        let roles: Vec<_> = agent.history().iter().map(ChatMessage::role).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool", "assistant"]
        );
        assert_eq!(
            agent.history().get(3),
            Some(&ChatMessage::Tool {
                tool_call_id: "call_get_character".to_string(),
                content: r#"Name: Rick Sanchez ({"character_id":1})"#.to_string(),
            })
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_tool_calls_are_reported_to_the_model() {
        let mut agent = agent([
            Ok(tool_call("get_location")),
            Ok(ChatMessage::assistant("I cannot look up locations.")),
        ]);

        agent.run("Where is the Citadel?").await.unwrap();

        let seen = agent.model.seen.lock().unwrap();
        assert_eq!(
            seen.get(1).and_then(|messages| messages.last()),
            Some(&ChatMessage::Tool {
                tool_call_id: "call_get_location".to_string(),
                content: "Error: Tool get_location not found".to_string(),
            })
        );
        assert!(logs_contain("Tool call failed"));
        assert!(!logs_contain("WARN"));
    }

    #[tokio::test]
    async fn stops_after_max_steps_and_rolls_back() {
        let config = AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        };
        let mut agent = McpAgent::new(
            ScriptedModel::new((0..5).map(|_| Ok(tool_call("get_character")))),
            FakeTools,
            &config,
        );

        let error = agent.run("Loop forever").await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "Agent stopped after reaching the maximum of 2 steps"
        );
        assert_eq!(agent.model.seen.lock().unwrap().len(), 2);
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn llm_failure_keeps_earlier_turns() {
        let mut agent = agent([
            Ok(ChatMessage::assistant("Hi!")),
            Err(LlmError::Status {
                status: 503,
                body: "overloaded".to_string(),
            }),
        ]);

        agent.run("Hello").await.unwrap();
        let error = agent.run("Who is character 2?").await.unwrap_err();

        assert!(matches!(
            error,
            AgentError::Llm(LlmError::Status { status: 503, .. })
        ));
        assert_eq!(agent.history().len(), 3);
    }

    #[tokio::test]
    async fn remembers_turns_until_cleared() {
        let mut agent = agent([
            Ok(ChatMessage::assistant("Hi!")),
            Ok(ChatMessage::assistant("You said hello.")),
        ]);

        agent.run("Hello").await.unwrap();
        agent.run("What did I say?").await.unwrap();

        assert_eq!(
            agent.model.seen.lock().unwrap().get(1).map(Vec::len),
            Some(4)
        );

        agent.clear_conversation_history();

        assert_eq!(
            agent.history(),
            &[ChatMessage::system(AgentConfig::default().system_prompt)]
        );
    }

    #[tokio::test]
    async fn without_memory_each_turn_starts_fresh() {
        let config = AgentConfig {
            memory_enabled: false,
            ..AgentConfig::default()
        };
        let mut agent = McpAgent::new(
            ScriptedModel::new([
                Ok(ChatMessage::assistant("Hi!")),
                Ok(ChatMessage::assistant("No idea.")),
            ]),
            FakeTools,
            &config,
        );

        agent.run("Hello").await.unwrap();
        agent.run("What did I say?").await.unwrap();

        assert_eq!(
            agent.model.seen.lock().unwrap().get(1).map(Vec::len),
            Some(2)
        );
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn non_assistant_reply_is_an_error() {
        let mut agent = agent([Ok(ChatMessage::user("echo"))]);

        let error = agent.run("Hello").await.unwrap_err();

        assert!(matches!(error, AgentError::UnexpectedMessage("user")));
    }
}
