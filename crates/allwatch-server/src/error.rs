//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store failed and the coordinator halted.
    #[error("backing unavailable: {0}")]
    BackingUnavailable(String),

    /// The watcher was stopped.
    #[error("watcher stopped")]
    Stopped,

    /// The coordinator task is gone.
    #[error("coordinator shut down")]
    Shutdown,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;
