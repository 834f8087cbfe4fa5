//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    /// User input out of range or missing. The queue is never touched.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not signed in: {0}")]
    NotAuthenticated(String),

    /// The local queue could not be read or written. Fatal to a submission.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// The ledger answered, but not with a success.
    #[error("Ledger error: {0}")]
    Remote(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LoggerError>;
