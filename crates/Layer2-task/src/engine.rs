//! Task Engine - orchestrates preload/download runs
//!
//! Features:
//! - Task lifecycle management (create, cancel, retry, delete)
//! - One worker per run, streaming tool output into the record
//! - Network flood detection with early abort
//! - Snapshot queries that never wait on a running process

use crate::command::{ToolCommand, DEFAULT_TOOL};
use crate::deps::{check_dependencies, DependencyReport};
use crate::interpreter::{interpret, LineOutcome};
use crate::link::SpotifyLink;
use crate::log::{LogEntry, LogLevel};
use crate::network::{probe_connectivity, NetworkMonitor, NetworkVerdict};
use crate::state::TaskStatus;
use crate::store::TaskStore;
use crate::supervisor::{LocalSupervisor, Supervisor, DEFAULT_GRACE_PERIOD};
use crate::task::{TaskId, TaskKind, TaskRecord};
use futures::StreamExt;
use grove_foundation::{ConfigStore, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for the task engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program launched for every run
    pub tool: String,

    /// Time between SIGTERM and SIGKILL
    pub grace_period: Duration,

    /// DNS/connection lines tolerated per run before aborting
    pub network_error_threshold: u32,

    /// Reachability probe target; `None` skips the probe
    pub probe_addr: Option<SocketAddr>,

    pub probe_timeout: Duration,

    /// Interval used by [`TaskEngine::wait`]
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            network_error_threshold: 10,
            probe_addr: Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(8, 8, 8, 8),
                53,
            ))),
            probe_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn network_error_threshold(mut self, threshold: u32) -> Self {
        self.network_error_threshold = threshold;
        self
    }

    /// Disable the reachability probe
    pub fn without_probe(mut self) -> Self {
        self.probe_addr = None;
        self
    }

    pub fn probe(mut self, addr: SocketAddr, timeout: Duration) -> Self {
        self.probe_addr = Some(addr);
        self.probe_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Task counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// What the worker does after one line
enum LineStep {
    Continue,
    Cancelled,
    Abort,
}

/// Task Engine - handles task lifecycle and execution
#[derive(Clone)]
pub struct TaskEngine {
    /// All tasks by ID
    store: Arc<TaskStore>,

    /// Process backend
    supervisor: Arc<dyn Supervisor>,

    /// User settings (credentials, paths, audio format)
    settings: Arc<ConfigStore>,

    config: Arc<EngineConfig>,

    /// Workers per task that have not returned yet
    active: Arc<Mutex<HashMap<TaskId, usize>>>,
}

impl TaskEngine {
    /// Engine running the tool as local child processes
    pub fn new(settings: Arc<ConfigStore>, config: EngineConfig) -> Self {
        let supervisor = Arc::new(LocalSupervisor::with_grace_period(config.grace_period));
        Self::with_supervisor(settings, config, supervisor)
    }

    /// Engine with a custom process backend
    pub fn with_supervisor(
        settings: Arc<ConfigStore>,
        config: EngineConfig,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        info!(
            "Task engine ready (tool: {}, supervisor: {})",
            config.tool,
            supervisor.name()
        );
        Self {
            store: Arc::new(TaskStore::new()),
            supervisor,
            settings,
            config: Arc::new(config),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &Arc<ConfigStore> {
        &self.settings
    }

    // ========================================================================
    // Task creation
    // ========================================================================

    /// Start a metadata-only run for `url`
    pub fn preload(&self, url: impl Into<String>) -> TaskId {
        let id = self.store.insert(TaskRecord::preload(url));
        info!("Created preload task {}", id.short());
        self.spawn_worker(id);
        id
    }

    /// Start a download of `url` into `path` (or the configured default)
    pub fn download(&self, url: impl Into<String>, path: Option<PathBuf>) -> TaskId {
        let path = path.unwrap_or_else(|| self.settings.snapshot().default_download_path.clone());
        let id = self.store.insert(TaskRecord::download(url, Some(path)));
        info!("Created download task {}", id.short());
        self.spawn_worker(id);
        id
    }

    fn spawn_worker(&self, id: TaskId) {
        *self.active.lock().entry(id).or_insert(0) += 1;

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(id).await;
            engine.worker_done(id);
        });
    }

    fn worker_done(&self, id: TaskId) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                active.remove(&id);
            }
        }
    }

    /// A worker for `id` is still running (including its final bookkeeping)
    pub fn is_active(&self, id: TaskId) -> bool {
        self.active.lock().contains_key(&id)
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Stop a running task
    ///
    /// The record flips to `cancelled` immediately; the process is
    /// terminated after the lock is released.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        self.store.transition(
            &id,
            |record| require_status(record, TaskStatus::Running, "cancel"),
            |record| {
                record.mark_cancelled();
                record.push_log(LogEntry::system("Stop requested by user"));
            },
        )?;
        info!("Task {}: Stop requested by user", id.short());

        if self.supervisor.terminate(id) {
            debug!("Termination issued for task {}", id.short());
        }
        Ok(())
    }

    /// Start a new run of a failed task with its original URL and path
    pub fn retry(&self, id: TaskId) -> Result<()> {
        let kind = self.store.transition(
            &id,
            |record| require_status(record, TaskStatus::Failed, "retry"),
            |record| {
                record.reset_for_retry();
                record.push_log(LogEntry::system("Retrying failed task"));
                record.kind
            },
        )?;
        info!("Task {}: Retrying failed {}", id.short(), kind);

        self.spawn_worker(id);
        Ok(())
    }

    /// Terminate any live process, then forget the task
    pub fn delete(&self, id: TaskId) -> Result<()> {
        if !self.store.contains(&id) {
            return Err(Error::NotFound(id.to_string()));
        }

        self.supervisor.terminate(id);
        self.store
            .remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        info!("Deleted task {}", id.short());
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of one task
    pub fn get(&self, id: TaskId) -> Result<TaskRecord> {
        self.store
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Snapshot of every task, oldest first
    pub fn list(&self) -> Vec<TaskRecord> {
        self.store.list()
    }

    /// Log entries of one task
    pub fn get_logs(&self, id: TaskId) -> Result<Vec<LogEntry>> {
        self.store
            .read(&id, |record| record.logs.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Poll until the task leaves `running` and its worker has finished
    pub async fn wait(&self, id: TaskId) -> Result<TaskRecord> {
        loop {
            let record = self.get(id)?;
            if record.status.is_terminal() && !self.is_active(id) {
                return Ok(record);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats::default();
        for record in self.store.list() {
            stats.total += 1;
            match record.status {
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn validate_url(&self, url: &str) -> Result<SpotifyLink> {
        SpotifyLink::parse(url)
    }

    pub fn check_dependencies(&self) -> DependencyReport {
        check_dependencies(&self.config.tool)
    }

    // ========================================================================
    // Worker
    // ========================================================================

    async fn run(&self, id: TaskId) {
        let Some((kind, url, path)) = self
            .store
            .read(&id, |r| (r.kind, r.url.clone(), r.download_path.clone()))
        else {
            return;
        };

        // cancelled before the worker got scheduled
        if self.is_cancelled(id) {
            self.finalize(id, kind, Err(Error::Cancelled));
            return;
        }

        let result = match kind {
            TaskKind::Preload => self.run_preload(id, &url).await,
            TaskKind::Download => {
                if let Err(e) = self.check_connectivity().await {
                    self.fail_offline(id, e);
                    return;
                }
                self.run_download(id, &url, path).await
            }
        };

        self.finalize(id, kind, result);
    }

    async fn run_preload(&self, id: TaskId, url: &str) -> Result<()> {
        self.log(id, LogEntry::system(format!("Starting metadata preload for: {}", url)));

        let settings = self.settings.snapshot();
        let command = ToolCommand::preload(&self.config.tool, url, &settings);
        self.execute(id, &command).await
    }

    async fn run_download(&self, id: TaskId, url: &str, path: Option<PathBuf>) -> Result<()> {
        let settings = self.settings.snapshot();
        let path = path.unwrap_or_else(|| settings.default_download_path.clone());

        self.log(id, LogEntry::system(format!("Starting download for: {}", url)));
        self.log(id, LogEntry::system(format!("Download path: {}", path.display())));

        tokio::fs::create_dir_all(&path).await?;

        let command = ToolCommand::download(&self.config.tool, url, &path, &settings);
        self.execute(id, &command).await
    }

    async fn check_connectivity(&self) -> Result<()> {
        match self.config.probe_addr {
            Some(addr) => probe_connectivity(addr, self.config.probe_timeout).await,
            None => Ok(()),
        }
    }

    /// Spawn the tool, feed its lines to the interpreter and reap it
    async fn execute(&self, id: TaskId, command: &ToolCommand) -> Result<()> {
        if self.is_cancelled(id) {
            return Err(Error::Cancelled);
        }

        self.log(id, LogEntry::system(format!("Executing: {}", command.display_safe())));
        let mut lines = self.supervisor.spawn(id, command).await?;

        // cancel may have landed before the process was registered
        if self.is_cancelled(id) {
            self.supervisor.terminate(id);
        }

        let mut monitor = NetworkMonitor::new(self.config.network_error_threshold);
        let mut aborted = false;

        while let Some(line) = lines.next().await {
            let step = self.store.mutate(&id, |record| {
                if record.cancelled {
                    return LineStep::Cancelled;
                }
                match interpret(record, &line) {
                    LineOutcome::Recorded => LineStep::Continue,
                    LineOutcome::Network(issue) => match monitor.record(issue) {
                        NetworkVerdict::Warn(message) => {
                            warn!("Task {}: {}", id.short(), message);
                            record.push_log(LogEntry::warning(message));
                            LineStep::Continue
                        }
                        NetworkVerdict::Quiet => LineStep::Continue,
                        NetworkVerdict::Abort => LineStep::Abort,
                    },
                }
            });

            match step {
                Some(LineStep::Continue) => debug!("Task {}: {}", id.short(), line),
                Some(LineStep::Cancelled) | None => {
                    self.supervisor.terminate(id);
                    break;
                }
                Some(LineStep::Abort) => {
                    warn!(
                        "Task {}: {} network errors, aborting run",
                        id.short(),
                        monitor.total()
                    );
                    self.supervisor.terminate(id);
                    aborted = true;
                    break;
                }
            }
        }
        drop(lines);

        let outcome = self.supervisor.wait(id).await?;
        if aborted {
            return Err(monitor.abort_error());
        }
        if self.is_cancelled(id) {
            return Err(Error::Cancelled);
        }
        outcome.into_result()
    }

    /// Settle the run's status and write the closing log line
    fn finalize(&self, id: TaskId, kind: TaskKind, result: Result<()>) {
        let label = match kind {
            TaskKind::Preload => "Preload",
            TaskKind::Download => "Download",
        };

        let entry = self.store.mutate(&id, |record| {
            let entry = if record.cancelled {
                record.status = TaskStatus::Cancelled;
                LogEntry::system(format!("{} cancelled by user", label))
            } else {
                match &result {
                    Ok(()) => {
                        record.status = TaskStatus::Completed;
                        if kind == TaskKind::Preload {
                            record.progress = 100;
                        }
                        LogEntry::system(match kind {
                            TaskKind::Preload => "Metadata preload completed".to_string(),
                            TaskKind::Download => "Download completed successfully!".to_string(),
                        })
                    }
                    Err(e) => {
                        record.status = TaskStatus::Failed;
                        LogEntry::error(format!("{} failed: {}", label, e))
                    }
                }
            };
            record.push_log(entry.clone());
            entry
        });

        match entry {
            Some(entry) if entry.level == LogLevel::Error => {
                error!("Task {}: {}", id.short(), entry.content)
            }
            Some(entry) => info!("Task {}: {}", id.short(), entry.content),
            None => debug!("Task {} was deleted before it finished", id.short()),
        }
    }

    /// Probe failed: one log line, no process
    ///
    /// A cancel that landed during the probe wins over the failure.
    fn fail_offline(&self, id: TaskId, cause: Error) {
        let message = match &cause {
            Error::Connectivity(message) => message.clone(),
            other => other.to_string(),
        };
        let failed = self.store.mutate(&id, |record| {
            if record.cancelled {
                return false;
            }
            record.status = TaskStatus::Failed;
            record.push_log(LogEntry::error(message.clone()));
            true
        });

        match failed {
            Some(true) => error!("Task {}: {}", id.short(), message),
            Some(false) => self.finalize(id, TaskKind::Download, Err(Error::Cancelled)),
            None => debug!("Task {} was deleted during the connectivity check", id.short()),
        }
    }

    fn is_cancelled(&self, id: TaskId) -> bool {
        // a deleted record counts as cancelled
        self.store.read(&id, |r| r.cancelled).unwrap_or(true)
    }

    /// Append to the task log and mirror it to tracing
    fn log(&self, id: TaskId, entry: LogEntry) {
        match entry.level {
            LogLevel::Output => debug!("Task {}: {}", id.short(), entry.content),
            LogLevel::System => info!("Task {}: {}", id.short(), entry.content),
            LogLevel::Warning => warn!("Task {}: {}", id.short(), entry.content),
            LogLevel::Error => error!("Task {}: {}", id.short(), entry.content),
        }
        self.store.mutate(&id, |record| record.push_log(entry));
    }
}

fn require_status(record: &TaskRecord, expected: TaskStatus, operation: &str) -> Result<()> {
    if record.status == expected {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "cannot {} task {}: status is {}",
            operation, record.id, record.status
        )))
    }
}
