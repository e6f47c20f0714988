//! Error types for the midden engine.

/// Top-level error type for the inventory disposal engine.
#[derive(Debug, thiserror::Error)]
pub enum MiddenError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Discard pipeline error (bad start request, job state).
    #[error("discard error: {0}")]
    Discard(String),

    /// Run-history persistence error.
    #[error("history error: {0}")]
    History(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MiddenError>;
