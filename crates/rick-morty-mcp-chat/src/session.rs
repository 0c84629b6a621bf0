//! The interactive chat loop
//!
//! Reads user lines, handles the `exit`, `quit` and `clear` commands, and
//! forwards everything else to the agent. The loop is `Running` until a
//! command, end of input, or the shutdown future moves it to `Terminated`.
//! [converse] closes the MCP sessions once the loop is over.

use std::future::Future;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::agent::{Agent, McpAgent};
use crate::client::McpClient;
use crate::llm::ChatModel;

pub const BANNER: &str = "\n===== Interactive MCP Chat (Rick and Morty) =====\n\
Type 'exit' or 'quit' to end the conversation\n\
Type 'clear' to clear conversation history\n\
=================================================\n\n";

const PROMPT: &str = "\nYou: ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Terminated,
}

/// What one input line asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Clear,
    Message(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let command = line.trim();
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else if command.eq_ignore_ascii_case("clear") {
            Self::Clear
        } else {
            Self::Message(line)
        }
    }
}

pub struct Session<A, W> {
    agent: A,
    input: mpsc::Receiver<String>,
    output: W,
    state: SessionState,
}

impl<A: Agent, W: AsyncWrite + Unpin> Session<A, W> {
    /// `input` yields lines without their newline; a closed channel is end of input
    pub fn new(agent: A, input: mpsc::Receiver<String>, output: W) -> Self {
        Self {
            agent,
            input,
            output,
            state: SessionState::Running,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    /// Converse until terminated. Only output failures are returned.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        tokio::pin!(shutdown);
        self.say(BANNER).await?;

        while self.state == SessionState::Running {
            self.say(PROMPT).await?;
            let line = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                line = self.input.recv() => line,
            };
            let Some(line) = line else {
                debug!("Input closed or shutdown requested");
                self.terminate().await?;
                break;
            };

            match Command::parse(&line) {
                Command::Exit => {
                    self.say("Ending conversation...\n").await?;
                    self.state = SessionState::Terminated;
                }
                Command::Clear => {
                    self.agent.clear_conversation_history();
                    self.say("Conversation history cleared.\n").await?;
                }
                Command::Message(message) => {
                    self.say("\nAssistant: ").await?;
                    let result = tokio::select! {
                        biased;
                        _ = &mut shutdown => None,
                        result = self.agent.run(message) => Some(result),
                    };
                    match result {
                        Some(Ok(reply)) => self.say(&format!("{reply}\n")).await?,
                        Some(Err(e)) => {
                            debug!(error = %e, "Agent turn failed");
                            self.say(&format!("\nError: {e}\n")).await?;
                        }
                        None => self.terminate().await?,
                    }
                }
            }
        }
        Ok(())
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.state = SessionState::Terminated;
        self.say("\n").await
    }

    async fn say(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}

/// Chat until the session ends, then close every MCP session of the agent
pub async fn converse<M: ChatModel>(
    agent: McpAgent<M, McpClient>,
    input: mpsc::Receiver<String>,
    output: impl AsyncWrite + Unpin,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    let mut session = Session::new(agent, input, output);
    let outcome = session.run(shutdown).await;
    session.into_agent().into_tools().close_all_sessions().await;
    outcome
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

/// Lines from stdin, read on a plain thread so a pending read never blocks runtime shutdown
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in io::stdin().lines() {
            match line {
                Ok(line) => {
                    if sender.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from stdin");
                    break;
                }
            }
        }
    });
    receiver
}
