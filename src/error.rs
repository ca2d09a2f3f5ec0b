//! Crate-level errors
//!
//! None of these cross the message boundary: protocol problems inside the
//! worker are logged and dropped. They surface only to code driving the
//! library directly (config loading, encoding, talking to a worker).

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum LayoutError {
    /// Configuration could not be loaded or is invalid
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A message could not be decoded or a snapshot encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker thread or its runtime could not be started
    #[error("failed to start layout worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker has shut down and no longer accepts commands
    #[error("layout worker is no longer running")]
    WorkerGone,
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;
