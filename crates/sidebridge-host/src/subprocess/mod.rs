//! Worker subprocess management.

mod pump;
pub mod supervisor;
pub mod writer;

pub use supervisor::{Supervisor, SupervisorError, SupervisorOptions, WorkerInfo};
pub use writer::CommandWriter;
