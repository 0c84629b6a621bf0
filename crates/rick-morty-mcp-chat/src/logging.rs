//! Logging for the chat binary
//!
//! Stdout carries the conversation, so logs go to a daily rolling file when a
//! path is set and to stderr (warnings only by default) otherwise.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    #[serde(deserialize_with = "level_from_str")]
    pub level: Level,

    /// Directory to write log files into
    pub path: Option<PathBuf>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            path: None,
        }
    }
}

fn level_from_str<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

impl Logging {
    /// Install the global subscriber. Keep the guard alive so file logs get flushed.
    pub fn setup(&self) -> Result<Option<WorkerGuard>, anyhow::Error> {
        let mut env_filter = EnvFilter::from_default_env().add_directive(self.level.into());
        if self.level <= Level::INFO {
            env_filter = env_filter.add_directive("rmcp=warn".parse()?);
        }

        match self.path.as_deref().map(file_writer) {
            Some(Ok((writer, guard))) => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(false)
                            .with_target(false),
                    )
                    .init();
                Ok(Some(guard))
            }
            fallback => {
                if let Some(Err(e)) = fallback {
                    eprintln!("Log file setup failed - falling back to stderr: {e}");
                }
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_target(false),
                    )
                    .init();
                Ok(None)
            }
        }
    }
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), anyhow::Error> {
    std::fs::create_dir_all(path)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rick_morty_mcp_chat")
        .filename_suffix("log")
        .build(path)?;
    Ok(tracing_appender::non_blocking(appender))
}
