//! Error types for coin view operations.

/// Errors that can surface from a coin view read or write-back.
///
/// Logic errors (flag misuse, forbidden overwrites, accounting drift) are not
/// represented here; those panic.
#[derive(Debug, thiserror::Error)]
pub enum CoinsViewError {
    /// I/O error from a durable backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored coin bytes failed to decode.
    #[error("coin decode failed: {0}")]
    Decode(#[from] bincode::Error),

    /// Backend-specific read failure.
    #[error("backend read failed: {0}")]
    Backend(String),

    /// The view does not accept write-backs.
    #[error("batch write is not supported by this view")]
    BatchWriteUnsupported,
}
