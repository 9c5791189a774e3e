use thiserror::Error;

/// Tagged-sum error kinds for the detection core (see design notes: avoid
/// class hierarchies, attach a cause instead).
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transient error: {0}")]
    Transient(String),
}

impl DetectorError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

/// Narrower error type owned by storage adapters; folded into
/// `DetectorError::Storage` at the detector boundary so adapter-specific
/// error types (`rusqlite::Error`, `sqlx::Error`, `std::io::Error`) never
/// leak into the public API.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(i64),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("backend io error: {0}")]
    Io(String),

    #[error("backend does not support this operation")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, DetectorError>;
