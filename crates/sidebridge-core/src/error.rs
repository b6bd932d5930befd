//! Error types for the `sidebridge` core library.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `sidebridge` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A tagged payload did not match its channel's schema
    #[error("Failed to decode {tag} payload: {reason}")]
    Decode { tag: &'static str, reason: String },

    /// A command could not be rendered as a single wire line
    #[error("Invalid worker command: {0}")]
    Command(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
