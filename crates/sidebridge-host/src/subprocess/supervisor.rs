//! Worker process lifecycle supervisor.
//!
//! Owns the one running worker: spawning, stdin access, termination and
//! exit observation all go through [`Supervisor`].

use std::borrow::Cow;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use sidebridge_core::LaunchSpec;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pump::{pump_stderr, pump_stdout};
use super::writer::{CommandWriter, single_line};
use crate::bridge::ChannelRouter;
use crate::events::{Diagnostic, EventBridge, ExitReport, WorkerLifecycle};

/// Timing knobs for worker termination.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Wait after SIGTERM before SIGKILL.
    pub terminate_timeout: Duration,
    /// Wait for buffered output after the process exits.
    pub drain_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            terminate_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_millis(500),
        }
    }
}

/// Identity of a started worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerInfo {
    pub worker_id: u64,
    pub pid: Option<u32>,
}

struct ActiveWorker {
    info: WorkerInfo,
    writer: CommandWriter,
    /// Dropping the sender also terminates the worker, so dropping the
    /// supervisor never leaves a worker behind.
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl ActiveWorker {
    fn signal_terminate(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

type Slot = Arc<Mutex<Option<ActiveWorker>>>;

fn lock_slot(slot: &Mutex<Option<ActiveWorker>>) -> MutexGuard<'_, Option<ActiveWorker>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-instance supervisor for the worker process.
pub struct Supervisor {
    events: Arc<EventBridge>,
    options: SupervisorOptions,
    current: Slot,
    /// Monitors of workers that were told to stop but may not have exited yet.
    retiring: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes start/stop/shutdown.
    lifecycle: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl Supervisor {
    pub fn new(events: Arc<EventBridge>, options: SupervisorOptions) -> Self {
        Self {
            events,
            options,
            current: Arc::new(Mutex::new(None)),
            retiring: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn events(&self) -> &Arc<EventBridge> {
        &self.events
    }

    /// Start a worker, terminating any previous one first.
    ///
    /// The previous worker's exit is awaited before the new process is
    /// spawned, so at most one worker runs at any time.
    pub async fn start(&self, spec: &LaunchSpec) -> Result<WorkerInfo, SupervisorError> {
        let _guard = self.lifecycle.lock().await;

        let previous = lock_slot(&self.current).take();
        if let Some(mut previous) = previous {
            info!(
                worker_id = previous.info.worker_id,
                "Terminating running worker before restart"
            );
            previous.signal_terminate();
            self.retire(previous.monitor);
        }
        self.await_retiring().await;

        let program = spec.program.display().to_string();
        info!(program = %program, args = ?spec.args, "Spawning worker");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Err(self.spawn_failed(program, e.to_string())),
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(self.spawn_failed(program, "Failed to capture worker stdio".to_string()));
        };

        let info = WorkerInfo {
            worker_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pid: child.id(),
        };
        let worker_id = info.worker_id;

        let (writer, writer_task) = CommandWriter::spawn(worker_id, stdin, Arc::clone(&self.events));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        // The slot is filled before anything can observe the worker, so
        // `send` works from the first `Started` or output callback on.
        {
            let mut slot = lock_slot(&self.current);
            let monitor = tokio::spawn(monitor_worker(Monitor {
                worker_id,
                child,
                kill_rx,
                ready_rx,
                output: WorkerOutput {
                    stdout,
                    stderr,
                    writer: writer_task,
                },
                slot: Arc::downgrade(&self.current),
                events: Arc::clone(&self.events),
                options: self.options,
            }));
            *slot = Some(ActiveWorker {
                info,
                writer,
                kill_tx: Some(kill_tx),
                monitor,
            });
        }

        info!(worker_id, pid = ?info.pid, "Worker started");
        self.events.publish_lifecycle(&WorkerLifecycle::Started {
            worker_id,
            pid: info.pid,
        });
        // Output is read only once `Started` has been delivered.
        let _ = ready_tx.send(());

        Ok(info)
    }

    /// Ask the running worker to terminate.
    ///
    /// Returns immediately; the exit is reported on the lifecycle channel.
    /// Returns `false` when no worker was running.
    pub async fn stop(&self) -> bool {
        let _guard = self.lifecycle.lock().await;
        let Some(mut worker) = lock_slot(&self.current).take() else {
            debug!("Stop requested with no worker running");
            return false;
        };
        info!(worker_id = worker.info.worker_id, "Stopping worker");
        worker.signal_terminate();
        self.retire(worker.monitor);
        true
    }

    /// Terminate the running worker and wait for every worker to exit.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        let running = lock_slot(&self.current).take();
        if let Some(mut worker) = running {
            info!(worker_id = worker.info.worker_id, "Shutting down worker");
            worker.signal_terminate();
            self.retire(worker.monitor);
        }
        self.await_retiring().await;
    }

    /// Queue `text` as one line on the worker's stdin.
    ///
    /// Never fails: with no worker running this logs a warning, publishes
    /// a `WriteWhileStopped` diagnostic and returns `false`.
    pub fn send(&self, text: &str) -> bool {
        let line = single_line(text);
        if matches!(line, Cow::Owned(_)) {
            warn!("Command contained line breaks; sending as a single line");
        }

        let writer = lock_slot(&self.current).as_ref().map(|w| w.writer.clone());
        if let Some(writer) = writer {
            debug!(worker_id = writer.worker_id(), command = %line, "Sending to worker");
            if writer.send(line.into_owned()) {
                return true;
            }
        }

        warn!(command = text, "Attempted to send a command but no worker is running");
        self.events.publish_diagnostic(&Diagnostic::WriteWhileStopped {
            command: text.to_string(),
        });
        false
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.current).is_some()
    }

    pub fn current(&self) -> Option<WorkerInfo> {
        lock_slot(&self.current).as_ref().map(|w| w.info)
    }

    /// Report a launch that produced no running worker.
    fn spawn_failed(&self, program: String, reason: String) -> SupervisorError {
        error!(program = %program, error = %reason, "Failed to spawn worker");
        self.events.publish_lifecycle(&WorkerLifecycle::SpawnFailed {
            program: program.clone(),
            reason: reason.clone(),
        });
        SupervisorError::SpawnFailed { program, reason }
    }

    fn retire(&self, monitor: JoinHandle<()>) {
        let mut retiring = self.retiring.lock().unwrap_or_else(PoisonError::into_inner);
        retiring.retain(|handle| !handle.is_finished());
        retiring.push(monitor);
    }

    async fn await_retiring(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .retiring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker monitor task failed");
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("current", &self.current())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct WorkerOutput {
    stdout: ChildStdout,
    stderr: ChildStderr,
    writer: JoinHandle<()>,
}

struct WorkerTasks {
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct Monitor {
    worker_id: u64,
    child: Child,
    kill_rx: oneshot::Receiver<()>,
    ready_rx: oneshot::Receiver<()>,
    output: WorkerOutput,
    /// Weak so that dropping the supervisor drops `kill_tx` and stops the worker.
    slot: Weak<Mutex<Option<ActiveWorker>>>,
    events: Arc<EventBridge>,
    options: SupervisorOptions,
}

/// Wait for the worker to exit (or be told to stop), drain its output,
/// release the slot, and publish exactly one `Exited` event.
async fn monitor_worker(monitor: Monitor) {
    let Monitor {
        worker_id,
        mut child,
        mut kill_rx,
        ready_rx,
        output,
        slot,
        events,
        options,
    } = monitor;

    // An error only means `start` was dropped mid-way; read the output regardless.
    let _ = ready_rx.await;
    let router = ChannelRouter::new(worker_id, Arc::clone(&events));
    let tasks = WorkerTasks {
        stdout: tokio::spawn(pump_stdout(output.stdout, router, worker_id)),
        stderr: tokio::spawn(pump_stderr(output.stderr, Arc::clone(&events), worker_id)),
        writer: output.writer,
    };

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = &mut kill_rx => None,
    };
    let (status, requested) = match exited {
        Some(status) => (status, false),
        None => (
            terminate(&mut child, worker_id, options.terminate_timeout).await,
            true,
        ),
    };

    drain_output(worker_id, tasks, options.drain_timeout).await;

    if let Some(current) = slot.upgrade() {
        let mut slot = lock_slot(&current);
        if slot.as_ref().is_some_and(|w| w.info.worker_id == worker_id) {
            *slot = None;
        }
    }

    let report = match status {
        Ok(status) => ExitReport::from_status(worker_id, status, requested),
        Err(e) => {
            error!(worker_id, error = %e, "Failed to collect worker exit status");
            ExitReport::unknown(worker_id, requested)
        }
    };
    if report.is_crash() {
        warn!(worker_id, code = ?report.code, signal = ?report.signal, "Worker crashed");
    } else {
        info!(worker_id, code = ?report.code, requested, "Worker exited");
    }
    events.publish_lifecycle(&WorkerLifecycle::Exited(report));
}

/// SIGTERM, then SIGKILL once `timeout` elapses.
async fn terminate(child: &mut Child, worker_id: u64, timeout: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        send_sigterm(child, worker_id);
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!(worker_id, error = %e, "Failed to kill worker");
        }
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(result) => result,
        Err(_) => {
            warn!(worker_id, "Timeout waiting for graceful shutdown, killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child, worker_id: u64) {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: pid comes from our own, not yet reaped, Child handle.
    // kill(2) with SIGTERM has no memory-safety implications.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
    if ret != 0 {
        let err = io::Error::last_os_error();
        warn!(worker_id, pid, error = %err, "Failed to send SIGTERM");
    }
}

/// Let the pumps deliver what the worker wrote before it exited.
async fn drain_output(worker_id: u64, tasks: WorkerTasks, timeout: Duration) {
    let WorkerTasks {
        mut stdout,
        mut stderr,
        writer,
    } = tasks;
    writer.abort();

    let deadline = tokio::time::Instant::now() + timeout;
    for (name, task) in [("stdout", &mut stdout), ("stderr", &mut stderr)] {
        match tokio::time::timeout_at(deadline, &mut *task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(worker_id, stream = name, error = %e, "Output reader failed"),
            Err(_) => {
                // A grandchild may still hold the pipe open.
                warn!(worker_id, stream = name, "Output still open after exit, abandoning");
                task.abort();
            }
        }
    }
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn worker {program}: {reason}")]
    SpawnFailed { program: String, reason: String },
}
