use strata_types::{ObjectId, TypeError};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No copy of the object exists at any depth.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Malformed identifier, depth, or path. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error from the underlying filesystem.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The store configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl StoreError {
    /// Returns `true` for the "no such object" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
