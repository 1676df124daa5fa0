//! Log output configuration.

use std::io::IsTerminal;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Layout of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Log output options.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct LogConfig {
    /// Layout of log lines written to standard error.
    #[arg(long, env = "ESDUMP_LOG_FORMAT", value_enum, default_value_t)]
    #[serde(default)]
    pub log_format: LogFormat,

    /// Disable colored log output.
    #[arg(long, env = "NO_COLOR")]
    #[serde(default)]
    pub no_color: bool,
}

impl LogConfig {
    /// Returns whether text logs should be colored.
    pub fn ansi(&self) -> bool {
        !self.no_color && std::io::stderr().is_terminal()
    }
}
