// models/src/errors.rs

use std::io;
pub use thiserror::Error;

use anyhow::Error as AnyhowError;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Storage error: {0}")]
    StorageError(String), // General storage operation error
    #[error("Database connection error: {0}")]
    ConnectionError(String), // Error connecting to the backend
    #[error("Transaction error: {0}")]
    TransactionError(String), // Error specific to transaction management
    #[error("Configuration error: {0}")]
    ConfigError(String), // Error with configuration loading or validation
    #[error("Failed to acquire lock: {0}")]
    LockError(String),
    #[error("An internal error occurred: {0}")]
    InternalError(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[cfg(feature = "postgres-errors")]
    #[error(transparent)]
    Postgres(#[from] postgres::Error),
}

// Fold anyhow-wrapped storage failures into the storage variant.
impl From<AnyhowError> for BillingError {
    fn from(err: AnyhowError) -> Self {
        BillingError::StorageError(format!("Underlying storage operation failed: {}", err))
    }
}

/// A validation error.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A CPT code string did not name one of the supported codes.
    #[error("unknown CPT code '{0}'")]
    UnknownCptCode(String),
    /// A service code string did not name a supported service.
    #[error("unknown service code '{0}'")]
    UnknownServiceCode(String),
    /// A cost category string did not name a supported category.
    #[error("unknown cost category '{0}'")]
    UnknownCostCategory(String),
    /// An invalid value was provided where a specific value was expected.
    #[error("invalid value provided: {0}")]
    InvalidValue(String),
    /// An invalid date format was provided.
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
}

/// A type alias for a `Result` that returns a `BillingError` on failure.
pub type BillingResult<T> = Result<T, BillingError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
