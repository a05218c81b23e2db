//! # grove-task
//!
//! Task engine for GroveGrab.
//! Drives the external download tool, infers progress from its output and
//! keeps cancellable, retryable task state for concurrent callers.
//!
//! ## Features
//!
//! - Task store with lock-scoped mutation
//! - Process supervision with merged output streaming
//! - Graceful termination (SIGTERM -> SIGKILL)
//! - Progress inference from free-text tool output
//! - Network flood detection and early abort

pub mod command;
pub mod deps;
pub mod engine;
pub mod interpreter;
pub mod link;
pub mod log;
pub mod network;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod task;

// Engine
pub use engine::{EngineConfig, EngineStats, TaskEngine};
pub use store::TaskStore;

// Task model
pub use log::{LogEntry, LogLevel};
pub use state::{TaskStatus, TrackStatus};
pub use task::{TaskId, TaskKind, TaskRecord, Track};

// Process supervision
pub use command::{ToolCommand, DEFAULT_TOOL};
pub use supervisor::{ExitOutcome, LineStream, LocalSupervisor, Supervisor};

// Output interpretation
pub use interpreter::{interpret, LineOutcome};
pub use network::{NetworkIssue, NetworkMonitor, NetworkVerdict};

// Environment
pub use deps::{check_dependencies, Dependency, DependencyReport};
pub use link::{LinkKind, SpotifyLink};
