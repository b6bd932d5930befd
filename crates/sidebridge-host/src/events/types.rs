//! Event payloads that originate in the host rather than in tagged output.

use std::process::ExitStatus;

use serde::Serialize;

/// Which worker stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// An untagged line of worker output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub worker_id: u64,
    pub stream: OutputStream,
    pub text: String,
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    pub worker_id: u64,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Terminating signal number, where the platform reports one.
    pub signal: Option<i32>,
    /// Whether the bridge asked the worker to stop.
    pub requested: bool,
}

impl ExitReport {
    pub fn from_status(worker_id: u64, status: ExitStatus, requested: bool) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            worker_id,
            code: status.code(),
            signal,
            requested,
        }
    }

    /// Exit status could not be collected.
    pub const fn unknown(worker_id: u64, requested: bool) -> Self {
        Self {
            worker_id,
            code: None,
            signal: None,
            requested,
        }
    }

    /// The worker went away on its own with a failure status.
    pub const fn is_crash(&self) -> bool {
        !self.requested && !matches!(self.code, Some(0))
    }
}

/// Worker lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerLifecycle {
    Started {
        worker_id: u64,
        pid: Option<u32>,
    },
    SpawnFailed {
        program: String,
        reason: String,
    },
    Exited(ExitReport),
}

/// Errors recovered locally and reported for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A tagged line whose tag has no channel.
    UnmappedTag { tag: String },
    /// A tagged line whose payload failed to decode.
    Decode { tag: String, reason: String },
    /// `send` was called with no worker running.
    WriteWhileStopped { command: String },
    /// Writing to the worker's stdin failed.
    WriteFailed { worker_id: u64, reason: String },
    /// Output lines over the length limit were discarded.
    LineTooLong {
        worker_id: u64,
        stream: OutputStream,
        count: usize,
    },
    /// A subscriber panicked while handling an event.
    SubscriberPanicked { channel: String, count: usize },
}
