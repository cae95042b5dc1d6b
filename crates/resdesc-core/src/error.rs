//! Error types for research description operations.

use thiserror::Error;

use crate::validation::ValidationReport;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for research description operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// research_id does not reference an existing research record
    #[error("Research not found for research_id {research_id}")]
    ForeignKeyViolation { research_id: i32 },

    /// Research description not found
    #[error("Research description not found: {0}")]
    NotFound(i32),

    /// Existing table has an incompatible shape
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// A table this one depends on is missing
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error was caused by the caller's input rather than the
    /// environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::ForeignKeyViolation { .. }
                | Error::NotFound(_)
                | Error::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
