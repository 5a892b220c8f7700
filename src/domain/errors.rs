//! Domain errors for the quest engine.

use thiserror::Error;

/// Domain-level errors that can occur while evaluating or executing quests.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Quest not found: {0}")]
    QuestNotFound(String),

    #[error("Quest already exists: {0}")]
    QuestExists(String),

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Name '{name}' is already claimed by {owner}")]
    NameTaken { name: String, owner: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl DomainError {
    /// Configuration errors fail a whole command batch instead of a single command.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownCondition(_) | Self::UnknownCommand(_) | Self::InvalidArguments { .. }
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for DomainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return DomainError::Timeout(0);
        }
        DomainError::NetworkError(err.to_string())
    }
}
