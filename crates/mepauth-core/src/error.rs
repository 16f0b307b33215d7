//! Error types for the mepauth core.

/// Core error type for mepauth infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum MepAuthError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for mepauth operations.
pub type MepAuthResult<T> = Result<T, MepAuthError>;
