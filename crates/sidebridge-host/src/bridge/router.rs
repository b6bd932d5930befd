//! Routes framed worker output lines to event channels.

use std::sync::Arc;

use sidebridge_core::protocol::{RouteOutcome, route_line};
use tracing::{debug, warn};

use crate::events::{Diagnostic, EventBridge, LogLine, OutputStream};

/// Per-worker line router.
///
/// Lines must be fed in the order the worker wrote them; each line's
/// events are delivered before `route` returns.
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    worker_id: u64,
    events: Arc<EventBridge>,
}

impl ChannelRouter {
    pub const fn new(worker_id: u64, events: Arc<EventBridge>) -> Self {
        Self { worker_id, events }
    }

    pub const fn events(&self) -> &Arc<EventBridge> {
        &self.events
    }

    pub fn route(&self, line: &str) {
        match route_line(line) {
            RouteOutcome::Log(text) => {
                debug!(worker_id = self.worker_id, "worker: {}", text);
                self.events.publish_log(&LogLine {
                    worker_id: self.worker_id,
                    stream: OutputStream::Stdout,
                    text,
                });
            }
            RouteOutcome::Event(event) => {
                debug!(
                    worker_id = self.worker_id,
                    channel = event.channel(),
                    "Routing worker event"
                );
                self.events.publish_event(&event);
            }
            RouteOutcome::Unmapped { tag } => {
                warn!(worker_id = self.worker_id, tag = %tag, line, "Unmapped command");
                self.events
                    .publish_diagnostic(&Diagnostic::UnmappedTag { tag });
            }
            RouteOutcome::Malformed { tag, reason } => {
                warn!(
                    worker_id = self.worker_id,
                    tag = tag.as_str(),
                    error = %reason,
                    "Dropping malformed payload"
                );
                self.events.publish_diagnostic(&Diagnostic::Decode {
                    tag: tag.as_str().to_string(),
                    reason,
                });
            }
        }
    }
}
