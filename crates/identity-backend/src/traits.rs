//! Backend capability traits.

use crate::{BackendResult, Session, SessionEvent, SignIn, User};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// The narrow surface the coordinator needs from an identity backend.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// The session the backend currently considers active, if any.
    async fn get_current_session(&self) -> BackendResult<Option<Session>>;

    /// Resolve the user owning `token`. `Ok(None)` means the token was rejected.
    async fn get_user_by_token(&self, token: &str) -> BackendResult<Option<User>>;

    /// Authenticate with an identifier (email) and secret (password).
    async fn sign_in_with_password(&self, identifier: &str, secret: &str)
        -> BackendResult<SignIn>;

    /// End the current session server-side.
    async fn sign_out(&self) -> BackendResult<()>;

    /// Register for session change events. Dropping the receiver unsubscribes.
    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent>;

    /// Hand the backend a session that was restored from local storage, so
    /// later calls (sign-out, refresh) act on it. Must not emit an event.
    fn adopt_session(&self, _session: &Session) {}
}

/// Source of extended profile attributes.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the complete user record. `Ok(None)` means no profile exists.
    async fn fetch_profile(&self, user_id: &str, access_token: &str)
        -> BackendResult<Option<User>>;
}
