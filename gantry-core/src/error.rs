//! Common error types for Gantry

use thiserror::Error;

/// Common result type for Gantry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the migration core
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced tenant/project/data source/import/job does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness invariant of the entity hierarchy was violated
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored row blob could not be decoded to a value sequence
    #[error("Serialization failure: {0}")]
    Serialization(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (corrupt stored identifier, invariant breach)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert a sqlx error into the domain error for a write path:
    /// unique-index violations become [`Error::ConstraintViolation`],
    /// everything else stays a database error.
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::ConstraintViolation(what.to_string())
            }
            _ => Error::Database(err),
        }
    }
}
