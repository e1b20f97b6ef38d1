//! Coordinator error types.

use identity_backend::BackendError;
use thiserror::Error;

/// Errors returned by the coordinator's foreground operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Wrong identifier or secret
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Account exists but is not confirmed yet
    #[error("Account not confirmed: {0}")]
    UnconfirmedAccount(String),

    /// Backend unreachable or failing (transient)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// `initialize` was already called on this coordinator
    #[error("Coordinator already initialized")]
    AlreadyInitialized,

    /// Operation needs an authenticated session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::InvalidCredentials(msg) => AuthError::InvalidCredentials(msg),
            BackendError::UnconfirmedAccount(msg) => AuthError::UnconfirmedAccount(msg),
            BackendError::Unavailable(msg) => AuthError::BackendUnavailable(msg),
            e if e.is_transient() => AuthError::BackendUnavailable(e.to_string()),
            e => AuthError::Backend(e),
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::BackendUnavailable(_))
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "The email or password is incorrect.",
            AuthError::UnconfirmedAccount(_) => {
                "Please confirm your account using the link we sent you, then try again."
            }
            AuthError::BackendUnavailable(_) => {
                "We couldn't reach the server. Check your connection and try again."
            }
            AuthError::AlreadyInitialized => "The session is already being managed.",
            AuthError::NotAuthenticated => "You need to sign in first.",
            AuthError::Backend(_) => "Something went wrong while talking to the server.",
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_typed_variants() {
        assert!(matches!(
            AuthError::from(BackendError::InvalidCredentials("bad".into())),
            AuthError::InvalidCredentials(_)
        ));
        assert!(matches!(
            AuthError::from(BackendError::UnconfirmedAccount("pending".into())),
            AuthError::UnconfirmedAccount(_)
        ));
        assert!(matches!(
            AuthError::from(BackendError::Unavailable("503".into())),
            AuthError::BackendUnavailable(_)
        ));
        assert!(matches!(
            AuthError::from(BackendError::Rejected("nope".into())),
            AuthError::Backend(_)
        ));
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(AuthError::BackendUnavailable("down".into()).is_transient());
        assert!(!AuthError::InvalidCredentials("bad".into()).is_transient());
        assert!(!AuthError::NotAuthenticated.is_transient());
    }

    #[test]
    fn test_user_messages_do_not_leak_details() {
        let err = AuthError::InvalidCredentials("user ana@example.com not found".into());
        assert!(!err.user_message().contains("ana@example.com"));
        assert_ne!(
            err.user_message(),
            AuthError::BackendUnavailable(String::new()).user_message()
        );
    }
}
