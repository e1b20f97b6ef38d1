//! Public authentication state snapshot.

use crate::AuthPhase;
use identity_backend::{Session, User};

/// The coordinator's authentication state. Exactly one variant is active.
///
/// Values handed out are snapshots; mutating them has no effect on the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No valid session. Stays here until a sign-in succeeds.
    Unauthenticated,
    /// Bootstrap in progress. Entered once, at process start.
    Restoring,
    /// A session confirmed by at least one source, with the user it belongs to.
    Authenticated { session: Session, user: User },
    /// A sign-out request is in flight.
    SigningOut,
}

impl AuthState {
    pub fn phase(&self) -> AuthPhase {
        match self {
            AuthState::Unauthenticated => AuthPhase::Unauthenticated,
            AuthState::Restoring => AuthPhase::Restoring,
            AuthState::Authenticated { .. } => AuthPhase::Authenticated,
            AuthState::SigningOut => AuthPhase::SigningOut,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }
}
