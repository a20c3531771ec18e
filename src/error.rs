//! Crate-wide error type.

use thiserror::Error;

use crate::keys::KeyError;
use crate::pagination::TokenError;
use crate::storage::StorageError;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the pagination and service layers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }

    /// Whether the caller sent a bad request (400/404/409-equivalent).
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::Storage(StorageError::BackendUnavailable(_))
            | Error::Storage(StorageError::Serialization(_))
            | Error::Token(TokenError::Encode(_)) => false,
            _ => true,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Only transient backend failures qualify. Nothing in this crate
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(StorageError::BackendUnavailable(_)))
    }
}
