//! Error types for GroveGrab
//!
//! Every fallible operation in the workspace reports one of these variants.
//! The task engine maps them onto task outcomes: connectivity, process and
//! spawn errors end a run as `failed`, while not-found and invalid-state
//! errors go straight back to the caller.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// GroveGrab error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Task execution
    // ========================================================================
    /// No network before spawn, or a flood of DNS/connection failures during a run
    #[error("Network error: {0}")]
    Connectivity(String),

    /// The external tool exited unsuccessfully
    #[error("Process exited with code {}", exit_code_label(.code))]
    Process { code: Option<i32> },

    /// The external tool could not be launched
    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Cancelled by user")]
    Cancelled,

    // ========================================================================
    // Caller errors
    // ========================================================================
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversion
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Spawn {
            program: program.into(),
            reason: reason.into(),
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}
