//! The UI boundary: worker control plus event subscriptions.

mod router;

use std::sync::Arc;

use sidebridge_core::protocol::WorkerCommand;
use sidebridge_core::{AppKind, LaunchSpec, WorkerConfig};

pub use router::ChannelRouter;

use crate::events::EventBridge;
use crate::subprocess::{Supervisor, SupervisorError, SupervisorOptions, WorkerInfo};

/// Everything a front-end needs: start/stop the worker, send it
/// commands, and subscribe to what it reports.
#[derive(Debug)]
pub struct SidecarBridge {
    config: WorkerConfig,
    events: Arc<EventBridge>,
    supervisor: Supervisor,
}

impl SidecarBridge {
    pub fn new(config: WorkerConfig) -> Self {
        let events = Arc::new(EventBridge::new());
        let options = SupervisorOptions {
            terminate_timeout: config.terminate_timeout(),
            drain_timeout: config.drain_timeout(),
        };
        let supervisor = Supervisor::new(Arc::clone(&events), options);
        Self {
            config,
            events,
            supervisor,
        }
    }

    /// Subscription points, one per channel.
    pub fn events(&self) -> &EventBridge {
        &self.events
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Launch the worker for `kind` with `args` after the binary path.
    pub async fn start_worker(
        &self,
        kind: AppKind,
        args: &[String],
    ) -> Result<WorkerInfo, SupervisorError> {
        let spec = self.config.launch_spec(kind, args);
        self.supervisor.start(&spec).await
    }

    /// Log in to the chat worker as `user`.
    pub async fn start_chat(&self, user: &str) -> Result<WorkerInfo, SupervisorError> {
        self.start_worker(AppKind::Chat, &[user.to_string()]).await
    }

    pub async fn start_music(&self) -> Result<WorkerInfo, SupervisorError> {
        self.start_worker(AppKind::Music, &[]).await
    }

    /// Launch an arbitrary program as the worker.
    pub async fn start_spec(&self, spec: &LaunchSpec) -> Result<WorkerInfo, SupervisorError> {
        self.supervisor.start(spec).await
    }

    pub async fn stop_worker(&self) -> bool {
        self.supervisor.stop().await
    }

    /// Fire-and-forget raw command; see [`Supervisor::send`].
    pub fn send_command(&self, text: &str) -> bool {
        self.supervisor.send(text)
    }

    /// Render and send a typed command.
    pub fn send(&self, command: &WorkerCommand) -> sidebridge_core::Result<bool> {
        let line = command.to_line()?;
        Ok(self.supervisor.send(&line))
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn current_worker(&self) -> Option<WorkerInfo> {
        self.supervisor.current()
    }

    /// Terminate the worker and wait for it; call before the host exits.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}
