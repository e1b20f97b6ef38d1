//! Backend error types.

use thiserror::Error;

/// Errors reported by an identity backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Wrong identifier or secret
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Account exists but has not been confirmed yet
    #[error("Account not confirmed: {0}")]
    UnconfirmedAccount(String),

    /// Backend could not be reached or answered with a server error
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Returns true if the failure is transient and the call may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable(_) => true,
            BackendError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;
