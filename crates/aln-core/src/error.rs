//! Typed error kinds for the core services (spec.md §7). Handlers in
//! `aln-server` map these onto HTTP status codes / wire `ApiError`s; the
//! core never formats an HTTP response itself.

use aln_protocol::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("media player failure: {0}")]
    MediaPlayer(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::NotFound(_) => ErrorCode::NotFound,
            // Conflict has no dedicated wire code in the closed set (spec.md §6);
            // callers that need 409 semantics match on CoreError::Conflict directly
            // before falling back to this mapping.
            CoreError::Conflict(_) => ErrorCode::ValidationError,
            CoreError::Persistence(_) | CoreError::MediaPlayer(_) | CoreError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
