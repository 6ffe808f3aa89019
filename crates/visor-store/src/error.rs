use visor_types::ContentKey;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested value was not found.
    #[error("not found: {0}")]
    NotFound(ContentKey),

    /// The stored bytes could not be decoded into the requested type.
    #[error("failed to decode {key}: {reason}")]
    Decode { key: ContentKey, reason: String },

    /// The value could not be serialized for storage.
    #[error("failed to encode value: {0}")]
    Encode(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the request.
    #[error("context cancelled")]
    Cancelled,

    /// The caller's deadline passed before the request completed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Backend is unreachable or otherwise unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` if the error came from the caller's context rather
    /// than from the backend.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
