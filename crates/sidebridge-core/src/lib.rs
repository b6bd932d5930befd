//! `sidebridge` Core Library
//!
//! Runtime-free pieces of the sidecar bridge:
//! - Line framing for arbitrarily chunked worker output
//! - Tagged command classification and payload decoding
//! - Configuration resolution and worker launch profiles
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::{AppKind, Config, LaunchSpec, WorkerConfig};
pub use error::{Error, Result};
