//! sidebridge Host Library
//!
//! Runs the external worker as a sidecar process and bridges it to a UI:
//! - Supervisor owning the single worker process and its lifecycle
//! - Stdin command writer and stdout/stderr pumps
//! - Channel router from tagged output lines to typed events
//! - Publish/subscribe event bridge consumed by the renderer

pub mod bridge;
pub mod events;
pub mod subprocess;

pub use bridge::SidecarBridge;
pub use events::{EventBridge, Subscription};
pub use subprocess::{Supervisor, SupervisorError, WorkerInfo};
