//! Error types for quota state operations

/// Errors from quota state and reset-time operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("quota state corrupt: {0}")]
    StateCorrupt(String),

    #[error("quota lock failed: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("cannot parse reset time: {0}")]
    Parse(String),
}

/// Result alias for quota operations.
pub type Result<T> = std::result::Result<T, Error>;
