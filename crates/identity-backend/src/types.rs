//! Session and user types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile attributes attached to a user.
///
/// Every field is optional. Merging follows a non-regression rule: a field
/// is only ever added or replaced by a non-empty value, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn merge_field(current: &mut Option<String>, incoming: &Option<String>) -> bool {
    match incoming {
        Some(value) if !value.trim().is_empty() && current.as_ref() != Some(value) => {
            *current = Some(value.clone());
            true
        }
        _ => false,
    }
}

impl Profile {
    /// Merge `incoming` into `self` without regressing any field.
    ///
    /// Returns true if anything changed.
    pub fn merge(&mut self, incoming: &Profile) -> bool {
        // Non-short-circuiting `|` so every field is visited.
        merge_field(&mut self.display_name, &incoming.display_name)
            | merge_field(&mut self.handle, &incoming.handle)
            | merge_field(&mut self.avatar_url, &incoming.avatar_url)
            | merge_field(&mut self.bio, &incoming.bio)
            | merge_field(&mut self.locale, &incoming.locale)
            | merge_field(&mut self.role, &incoming.role)
    }
}

/// A user: stable identifier plus profile attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub profile: Profile,
}

impl User {
    /// A user with no profile attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile: Profile::default(),
        }
    }

    /// Builder-style profile setter.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Merge another record for the same user. Records for a different user
    /// are ignored. Returns true if anything changed.
    pub fn merge_from(&mut self, other: &User) -> bool {
        if other.id != self.id {
            return false;
        }
        self.profile.merge(&other.profile)
    }
}

/// Credential bundle proving an authenticated identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Profile attributes carried in the session payload itself.
    #[serde(default)]
    pub user_metadata: Profile,
}

impl Session {
    /// A session issued now with no refresh token, expiry, or metadata.
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user_id: user_id.into(),
            issued_at: Utc::now(),
            expires_at: None,
            user_metadata: Profile::default(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_user_metadata(mut self, metadata: Profile) -> Self {
        self.user_metadata = metadata;
        self
    }

    /// True when the session carries an expiry at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether `other` is the same credential (same generation) as `self`.
    pub fn is_same_credential(&self, other: &Session) -> bool {
        self.user_id == other.user_id && self.access_token == other.access_token
    }

    /// The user derivable from this session without another round-trip.
    pub fn minimal_user(&self) -> User {
        User::new(self.user_id.clone()).with_profile(self.user_metadata.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful password sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub session: Session,
    pub user: User,
}

/// Session change reported by the backend's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session is active (sign-in elsewhere, restore, or token refresh).
    Active(Session),
    /// No session exists any more.
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile(name: Option<&str>, bio: Option<&str>) -> Profile {
        Profile {
            display_name: name.map(String::from),
            bio: bio.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_never_regresses_fields() {
        let mut current = profile(Some("A"), None);
        let changed = current.merge(&profile(None, Some("hello")));

        assert!(changed);
        assert_eq!(current, profile(Some("A"), Some("hello")));
    }

    #[test]
    fn test_merge_ignores_empty_strings() {
        let mut current = profile(Some("A"), Some("bio"));
        let changed = current.merge(&profile(Some("  "), Some("")));

        assert!(!changed);
        assert_eq!(current, profile(Some("A"), Some("bio")));
    }

    #[test]
    fn test_merge_replaces_with_non_empty() {
        let mut current = profile(Some("A"), None);
        assert!(current.merge(&profile(Some("B"), None)));
        assert_eq!(current.display_name.as_deref(), Some("B"));
        assert!(!current.merge(&profile(Some("B"), None)));
    }

    #[test]
    fn test_user_merge_requires_same_id() {
        let mut user = User::new("u1");
        let other = User::new("u2").with_profile(profile(Some("Eve"), None));
        assert!(!user.merge_from(&other));
        assert_eq!(user.profile, Profile::default());
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session::new("t", "u").with_expires_at(now - Duration::seconds(1));
        assert!(session.is_expired_at(now));
        assert!(!Session::new("t", "u").is_expired_at(now));
    }

    #[test]
    fn test_same_credential() {
        let a = Session::new("t1", "u1");
        let b = Session::new("t1", "u1").with_refresh_token("r");
        let c = Session::new("t2", "u1");
        assert!(a.is_same_credential(&b));
        assert!(!a.is_same_credential(&c));
    }

    #[test]
    fn test_minimal_user_carries_metadata() {
        let session =
            Session::new("t", "u1").with_user_metadata(profile(Some("Ana"), None));
        let user = session.minimal_user();
        assert_eq!(user.id, "u1");
        assert_eq!(user.profile.display_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_session_debug_hides_tokens() {
        let session =
            Session::new("super-secret-token", "u1").with_refresh_token("rotating-secret");
        let debug = format!("{session:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(!debug.contains("rotating-secret"));
    }
}
