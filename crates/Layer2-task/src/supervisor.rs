//! Process Supervisor - spawns the download tool and streams its output
//!
//! Features:
//! - stdout and stderr share one pipe, so lines arrive in emission order
//! - One reaper task per process owns the `Child`
//! - Graceful shutdown with SIGTERM -> SIGKILL escalation (process group on Unix)

use crate::command::ToolCommand;
use crate::task::TaskId;
use async_trait::async_trait;
use futures::Stream;
use grove_foundation::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
#[cfg(unix)]
use tokio::net::unix::pipe;

/// Default grace period between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

const LINE_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Exit outcome
// ============================================================================

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Termination was requested through the supervisor
    pub terminated: bool,
}

impl ExitOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            terminated: false,
        }
    }

    pub fn killed() -> Self {
        Self {
            code: None,
            terminated: true,
        }
    }

    fn from_status(status: ExitStatus, terminated: bool) -> Self {
        Self {
            code: status.code(),
            terminated,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// `Ok` on exit code 0, else a process error
    pub fn into_result(self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(Error::Process { code: self.code })
        }
    }
}

// ============================================================================
// Line stream
// ============================================================================

/// Merged, line-oriented output of one process
///
/// Finite: ends once the process has closed both output streams.
#[derive(Debug)]
pub struct LineStream {
    rx: mpsc::Receiver<String>,
}

impl LineStream {
    /// A stream plus the sender feeding it
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Next non-empty line, `None` at end of output
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for LineStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Supervisor trait
// ============================================================================

/// Supervisor trait - implement to add new process backends
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Launch `command` for task `id`
    async fn spawn(&self, id: TaskId, command: &ToolCommand) -> Result<LineStream>;

    /// Wait until the process for `id` is reaped
    async fn wait(&self, id: TaskId) -> Result<ExitOutcome>;

    /// Request termination; returns immediately
    ///
    /// `false` when there is no live process for `id`.
    fn terminate(&self, id: TaskId) -> bool;

    /// A process for `id` has been spawned and not yet exited
    fn is_running(&self, id: TaskId) -> bool;

    /// Get supervisor name
    fn name(&self) -> &'static str;
}

// ============================================================================
// Local supervisor
// ============================================================================

/// Handle kept for each spawned process
struct ProcessSlot {
    /// Termination request, consumed on first use
    stop: Option<oneshot::Sender<()>>,

    /// Exit report from the reaper, taken by `wait`
    exit: Option<oneshot::Receiver<std::io::Result<ExitOutcome>>>,

    finished: Arc<AtomicBool>,
}

/// Runs the tool as a child process of this one
pub struct LocalSupervisor {
    processes: Mutex<HashMap<TaskId, ProcessSlot>>,
    grace_period: Duration,
}

impl LocalSupervisor {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            processes: Mutex::new(HashMap::with_capacity(16)),
            grace_period,
        }
    }

    /// Number of processes not yet reaped by `wait`
    pub fn tracked(&self) -> usize {
        self.processes.lock().len()
    }
}

impl Default for LocalSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    async fn spawn(&self, id: TaskId, command: &ToolCommand) -> Result<LineStream> {
        if self.is_running(id) {
            return Err(Error::InvalidState(format!(
                "task {} already has a running process",
                id
            )));
        }

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // own process group, so termination reaches the tool's children too
        #[cfg(unix)]
        cmd.process_group(0);

        // both streams share one pipe so lines keep their emission order
        #[cfg(unix)]
        let reader = {
            let (reader, writer) = merged_output_pipe()?;
            let writer_err = writer.try_clone()?;
            cmd.stdout(Stdio::from(writer)).stderr(Stdio::from(writer_err));
            reader
        };
        #[cfg(not(unix))]
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let spawned = cmd.spawn();
        // the parent's copies of the write end must close, or EOF never arrives
        drop(cmd);
        #[allow(unused_mut)]
        let mut child = spawned.map_err(|e| {
            error!("Failed to launch {} for task {}: {}", command.program(), id.short(), e);
            Error::spawn(command.program(), e.to_string())
        })?;

        debug!(
            "Spawned {} for task {} (pid {:?})",
            command,
            id.short(),
            child.id()
        );

        let (tx, stream) = LineStream::channel(LINE_CHANNEL_CAPACITY);
        #[cfg(unix)]
        tokio::spawn(forward_lines(reader, tx));
        #[cfg(not(unix))]
        {
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(forward_lines(stdout, tx.clone()));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(forward_lines(stderr, tx));
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));

        let grace = self.grace_period;
        let reaper_finished = Arc::clone(&finished);
        tokio::spawn(async move {
            let outcome = reap(child, stop_rx, grace, id).await;
            reaper_finished.store(true, Ordering::SeqCst);
            let _ = exit_tx.send(outcome);
        });

        self.processes.lock().insert(
            id,
            ProcessSlot {
                stop: Some(stop_tx),
                exit: Some(exit_rx),
                finished,
            },
        );

        Ok(stream)
    }

    async fn wait(&self, id: TaskId) -> Result<ExitOutcome> {
        let exit_rx = {
            let mut processes = self.processes.lock();
            let slot = processes
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            slot.exit
                .take()
                .ok_or_else(|| Error::InvalidState(format!("task {} is already awaited", id)))?
        };

        let outcome = exit_rx.await;
        self.processes.lock().remove(&id);

        match outcome {
            Ok(Ok(outcome)) => {
                debug!("Task {} process exited: {:?}", id.short(), outcome);
                Ok(outcome)
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Internal(format!(
                "reaper for task {} stopped without a report",
                id
            ))),
        }
    }

    fn terminate(&self, id: TaskId) -> bool {
        let mut processes = self.processes.lock();
        let Some(slot) = processes.get_mut(&id) else {
            return false;
        };
        if slot.finished.load(Ordering::SeqCst) {
            return false;
        }
        match slot.stop.take() {
            Some(stop) => {
                debug!("Termination requested for task {}", id.short());
                stop.send(()).is_ok()
            }
            // already requested
            None => false,
        }
    }

    fn is_running(&self, id: TaskId) -> bool {
        self.processes
            .lock()
            .get(&id)
            .map(|slot| !slot.finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// One pipe whose write end serves as both stdout and stderr of the child
///
/// Both ends are close-on-exec; `Command` dups the write end onto fds 1
/// and 2 in the child, which clears the flag there.
#[cfg(unix)]
fn merged_output_pipe() -> std::io::Result<(pipe::Receiver, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nobody else
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(&read)?;
    set_cloexec(&write)?;

    // switches the read end to non-blocking and registers it with the reactor
    let reader = pipe::Receiver::from_owned_fd(read)?;
    Ok((reader, write))
}

#[cfg(unix)]
fn set_cloexec(fd: &OwnedFd) -> std::io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: fcntl(2) on a descriptor owned by `fd`
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Forward non-empty lines from one pipe into the channel
async fn forward_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end();
                if line.trim_start().is_empty() {
                    continue;
                }
                if tx.send(line.to_string()).await.is_err() {
                    // reader side is gone
                    break;
                }
            }
            Err(e) => {
                debug!("Output pipe closed with error: {}", e);
                break;
            }
        }
    }
}

/// Wait for the child, or terminate it when asked
async fn reap(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
    id: TaskId,
) -> std::io::Result<ExitOutcome> {
    tokio::select! {
        status = child.wait() => Ok(ExitOutcome::from_status(status?, false)),
        Ok(()) = &mut stop_rx => {
            let status = terminate_child(&mut child, grace, id).await?;
            Ok(ExitOutcome::from_status(status, true))
        }
    }
}

async fn terminate_child(
    child: &mut Child,
    grace: Duration,
    id: TaskId,
) -> std::io::Result<ExitStatus> {
    send_sigterm(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "Task {} did not exit within {:.1}s of SIGTERM, killing",
                id.short(),
                grace.as_secs_f64()
            );
            force_kill(child);
            child.wait().await
        }
    }
}

/// Send graceful termination signal to the process group
#[cfg(unix)]
fn send_sigterm(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) {
    // no SIGTERM outside Unix
    let _ = child.start_kill();
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGKILL);
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created at spawn
    let rc = unsafe { libc::kill(-pid, signal) };
    if rc != 0 {
        debug!(
            "kill({}, {}) failed: {}",
            -pid,
            signal,
            std::io::Error::last_os_error()
        );
    }
}
