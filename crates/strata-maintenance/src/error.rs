use strata_store::StoreError;

/// Errors from maintenance job control.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    /// A tree walker needs a tokio runtime to schedule its workers on.
    #[error("no tokio runtime available to run maintenance workers")]
    NoRuntime,

    /// Reading the store configuration failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for maintenance operations.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;
