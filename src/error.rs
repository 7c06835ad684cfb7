//! Error types for the fetch, store and synchronization layers.

use thiserror::Error;

/// Errors produced while fetching categories from the remote endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("Bad response code: {0}")]
    BadStatus(u16),

    /// The payload could not be decoded.
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// The server reported `success: false`.
    #[error("Server returned no data")]
    NoData,
}

/// Errors produced by the record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying database or filesystem failure.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A write violated a table constraint (duplicate id, ...).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &e {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return StoreError::ConstraintViolation(db_err.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Io(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Top-level error for the synchronization pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catch-all for failures that fit neither category.
    #[error("An unknown error has occurred: {0}")]
    Generic(String),

    /// The controller task has stopped and no longer accepts triggers.
    #[error("Sync controller is no longer running")]
    ControllerClosed,
}
