//! Storage Error Types

use thiserror::Error;

/// Result type alias for store and auth operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the data store and auth provider seams
#[derive(Error, Debug)]
pub enum StoreError {
    /// Row required by the operation is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated (e.g. duplicate checkout session id)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend rejected or failed the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// Auth provider failed (distinct from "token is invalid", which is `Ok(None)`)
    #[error("Auth provider error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Draft could not be turned into a memory
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),
}

impl StoreError {
    /// Check if retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Auth(_))
    }
}
