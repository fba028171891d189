use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid user id: {0:?}")]
    InvalidId(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
