//! Core error types.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store could not answer a request.
    #[error("backing error: {0}")]
    Backing(String),

    /// Invalid entity identifier.
    #[error("invalid entity id: {0}")]
    InvalidId(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
