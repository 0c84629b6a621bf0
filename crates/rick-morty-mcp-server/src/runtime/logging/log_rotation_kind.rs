use schemars::JsonSchema;
use serde::Deserialize;
use tracing_appender::rolling::Rotation;

/// How often a new log file is started
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotationKind {
    #[serde(alias = "MINUTELY", alias = "Minutely")]
    Minutely,
    #[serde(alias = "HOURLY", alias = "Hourly")]
    Hourly,
    #[serde(alias = "DAILY", alias = "Daily")]
    Daily,
    #[serde(alias = "NEVER", alias = "Never")]
    Never,
}

impl From<LogRotationKind> for Rotation {
    fn from(value: LogRotationKind) -> Self {
        match value {
            LogRotationKind::Minutely => Rotation::MINUTELY,
            LogRotationKind::Hourly => Rotation::HOURLY,
            LogRotationKind::Daily => Rotation::DAILY,
            LogRotationKind::Never => Rotation::NEVER,
        }
    }
}
