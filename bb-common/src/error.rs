//! Common error types for Breadboard

use thiserror::Error;

/// Common result type for Breadboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Breadboard crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON column could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Several records matched where exactly one was required
    #[error("Ambiguous: {0}")]
    Ambiguous(String),

    /// Write rejected by a uniqueness or referential constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a sqlx error raised by a write.
    ///
    /// Unique and foreign-key violations become [`Error::Conflict`] so the
    /// HTTP layer can answer 409 instead of 500.
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Error::Conflict(format!("{} already exists", what));
            }
            if db_err.is_foreign_key_violation() {
                return Error::Conflict(format!(
                    "{} is referenced by other records or references a missing record",
                    what
                ));
            }
        }
        Error::Database(err)
    }
}
