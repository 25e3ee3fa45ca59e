use thiserror::Error;

/// Top-level error type for Dhikra.
#[derive(Debug, Error)]
pub enum DhikraError {
    /// Error from the intent-extraction provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from the messaging gateway.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Storage error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
