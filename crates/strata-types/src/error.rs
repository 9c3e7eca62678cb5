use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object identifier: {0:?}")]
    InvalidObjectId(String),

    #[error("invalid shard depth: {0:?}")]
    InvalidDepth(String),
}
