//! Error types for the herald lifecycle engine.

/// Top-level error type for the module lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    /// Manifest file missing, malformed, or failing validation.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// State store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// Conditional script launch, exit-code, or timeout anomaly.
    #[error("condition error: {0}")]
    Condition(String),

    /// Module directory unreachable or unreadable at scan level.
    #[error("scan error: {0}")]
    Scan(String),

    /// Malformed process-wide setting.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HeraldError>;
