use thiserror::Error;

/// Failures raised by cache internals.
///
/// Nothing here escapes through the public [`ImageFileCache`] surface: the
/// orchestrator absorbs every error and reports it through logging. The enum
/// exists for the internal plumbing and for collaborator port
/// implementations.
///
/// [`ImageFileCache`]: crate::cache::ImageFileCache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Key-value store error: {0}")]
    Store(String),

    #[error("Background task failed: {0}")]
    Background(String),

    #[error("Cache ledger unavailable")]
    LedgerClosed,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;
