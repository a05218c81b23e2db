//! Shared fixtures: a scripted supervisor and engine builders

#![allow(dead_code)]

use async_trait::async_trait;
use grove_foundation::{ConfigStore, Error, GroveConfig, Result};
use grove_task::{
    EngineConfig, ExitOutcome, LineStream, Supervisor, TaskEngine, TaskId, TaskRecord,
    ToolCommand,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub const TRACK_URL: &str = "https://open.spotify.com/track/abc123";
pub const PLAYLIST_URL: &str = "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M";

/// What a fake process prints and how it ends
#[derive(Debug, Clone)]
pub struct Script {
    pub lines: Vec<String>,
    pub exit_code: i32,
    /// Keep running after the last line until terminated
    pub hold_open: bool,
    pub line_delay: Duration,
}

impl Script {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            exit_code: 0,
            hold_open: false,
            line_delay: Duration::from_millis(1),
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

struct FakeProcess {
    stop: Option<oneshot::Sender<()>>,
    exit: Option<oneshot::Receiver<ExitOutcome>>,
    finished: Arc<AtomicBool>,
}

/// In-memory supervisor replaying a script for every spawn
pub struct ScriptedSupervisor {
    script: Mutex<Script>,
    processes: Mutex<HashMap<TaskId, FakeProcess>>,
    commands: Mutex<Vec<ToolCommand>>,
    /// Time spent inside `spawn` before the process is registered
    spawn_delay: Mutex<Duration>,
    spawns: AtomicUsize,
    terminations: AtomicUsize,
}

impl ScriptedSupervisor {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            processes: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            spawn_delay: Mutex::new(Duration::ZERO),
            spawns: AtomicUsize::new(0),
            terminations: AtomicUsize::new(0),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn set_spawn_delay(&self, delay: Duration) {
        *self.spawn_delay.lock() = delay;
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().clone()
    }
}

async fn feed(tx: &tokio::sync::mpsc::Sender<String>, script: &Script) {
    for line in &script.lines {
        if tx.send(line.clone()).await.is_err() {
            break;
        }
        tokio::time::sleep(script.line_delay).await;
    }
    if script.hold_open {
        std::future::pending::<()>().await;
    }
}

#[async_trait]
impl Supervisor for ScriptedSupervisor {
    async fn spawn(&self, id: TaskId, command: &ToolCommand) -> Result<LineStream> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().push(command.clone());

        let delay = *self.spawn_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().clone();
        let (tx, stream) = LineStream::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));

        let done = Arc::clone(&finished);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = feed(&tx, &script) => ExitOutcome::exited(script.exit_code),
                Ok(()) = &mut stop_rx => ExitOutcome::killed(),
            };
            drop(tx);
            done.store(true, Ordering::SeqCst);
            let _ = exit_tx.send(outcome);
        });

        self.processes.lock().insert(
            id,
            FakeProcess {
                stop: Some(stop_tx),
                exit: Some(exit_rx),
                finished,
            },
        );
        Ok(stream)
    }

    async fn wait(&self, id: TaskId) -> Result<ExitOutcome> {
        let exit = self
            .processes
            .lock()
            .get_mut(&id)
            .and_then(|p| p.exit.take())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let outcome = exit
            .await
            .map_err(|_| Error::Internal("fake process vanished".to_string()))?;
        self.processes.lock().remove(&id);
        Ok(outcome)
    }

    fn terminate(&self, id: TaskId) -> bool {
        let mut processes = self.processes.lock();
        let Some(process) = processes.get_mut(&id) else {
            return false;
        };
        if process.finished.load(Ordering::SeqCst) {
            return false;
        }
        match process.stop.take() {
            Some(stop) => {
                self.terminations.fetch_add(1, Ordering::SeqCst);
                stop.send(()).is_ok()
            }
            None => false,
        }
    }

    fn is_running(&self, id: TaskId) -> bool {
        self.processes
            .lock()
            .get(&id)
            .map(|p| !p.finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .without_probe()
        .grace_period(Duration::from_millis(300))
        .poll_interval(Duration::from_millis(5))
}

pub fn settings(download_dir: &Path) -> Arc<ConfigStore> {
    Arc::new(ConfigStore::in_memory(
        GroveConfig::default().download_path(download_dir),
    ))
}

pub fn scripted_engine(download_dir: &Path, script: Script) -> (TaskEngine, Arc<ScriptedSupervisor>) {
    let supervisor = ScriptedSupervisor::new(script);
    let engine = TaskEngine::with_supervisor(
        settings(download_dir),
        test_config(),
        Arc::clone(&supervisor) as Arc<dyn Supervisor>,
    );
    (engine, supervisor)
}

/// Wait for a terminal status, failing the test after five seconds
pub async fn finish(engine: &TaskEngine, id: TaskId) -> TaskRecord {
    tokio::time::timeout(Duration::from_secs(5), engine.wait(id))
        .await
        .expect("task did not finish in time")
        .expect("task disappeared")
}

/// Poll until `predicate` holds for the task's snapshot
pub async fn until<F>(engine: &TaskEngine, id: TaskId, predicate: F) -> TaskRecord
where
    F: Fn(&TaskRecord) -> bool,
{
    let poll = async {
        loop {
            if let Ok(record) = engine.get(id) {
                if predicate(&record) {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("condition not reached in time")
}

pub fn log_contents(record: &TaskRecord) -> Vec<String> {
    record.logs.iter().map(|l| l.content.clone()).collect()
}
