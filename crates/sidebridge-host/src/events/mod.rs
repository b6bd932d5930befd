//! Event surface exposed to the rendering layer.

mod bridge;
mod topic;
mod types;

pub use bridge::EventBridge;
pub use topic::{Delivery, Subscription, Topic};
pub use types::{Diagnostic, ExitReport, LogLine, OutputStream, WorkerLifecycle};
