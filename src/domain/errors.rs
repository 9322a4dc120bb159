//! Domain errors for the Vigil verification scheduler.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the Vigil system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(String),

    #[error("Analysis context not found: {0}")]
    ContextNotFound(String),

    #[error("Analysis task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Collection task not found: {0}")]
    CollectionTaskNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Manager call failed: {0}")]
    ManagerError(String),
}

impl DomainError {
    /// Whether the error came from two writers racing on the same unique key.
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return DomainError::DuplicateKey(db_err.message().to_string());
            }
        }
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_classification() {
        assert!(DomainError::DuplicateKey("log_records".into()).is_duplicate());
        assert!(!DomainError::DatabaseError("locked".into()).is_duplicate());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: DomainError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }
}
