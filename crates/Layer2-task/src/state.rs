//! Task and track state machines

use serde::{Deserialize, Serialize};

/// Status of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The worker is active (or about to start)
    Running,

    /// The tool exited successfully
    Completed,

    /// The run ended in an error
    Failed,

    /// A user stopped the run
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Get a symbol for the state (for terminal output)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Cancelled => "⊘",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single track inside a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl TrackStatus {
    /// Completed and failed tracks are never moved back by output lines
    pub fn is_settled(&self) -> bool {
        matches!(self, TrackStatus::Completed | TrackStatus::Failed)
    }

    /// Queued or downloading
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TrackStatus::Queued | TrackStatus::Downloading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Queued => "queued",
            TrackStatus::Downloading => "downloading",
            TrackStatus::Completed => "completed",
            TrackStatus::Failed => "failed",
            TrackStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
