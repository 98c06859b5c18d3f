use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing write key")]
    MissingWriteKey,

    #[error("Invalid write key")]
    InvalidWriteKey,

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Whether the caller supplied bad input, as opposed to an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_)
                | DomainError::MissingWriteKey
                | DomainError::InvalidWriteKey
        )
    }
}
