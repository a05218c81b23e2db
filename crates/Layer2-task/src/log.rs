//! Task log entries
//!
//! Each task keeps an append-only list of these. Tool output is stored
//! verbatim; engine messages (start, finish, warnings) use the other levels.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// A line emitted by the external tool
    Output,
    /// Engine lifecycle messages (start, finish, cancel)
    System,
    /// Recoverable problems (network hiccups)
    Warning,
    /// Messages explaining a failure
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Output => "output",
            LogLevel::System => "system",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

/// A single timestamped log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub content: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            content: content.into(),
        }
    }

    pub fn output(content: impl Into<String>) -> Self {
        Self::new(LogLevel::Output, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LogLevel::System, content)
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, content)
    }
}

/// `[HH:MM:SS] content`, local time
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            self.content
        )
    }
}
