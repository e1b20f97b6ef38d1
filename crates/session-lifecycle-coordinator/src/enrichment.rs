//! Profile enrichment loader.

use identity_backend::{BackendResult, ProfileSource, User};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches the complete user record after authentication.
///
/// The loader only fetches. Merging into the installed user, and deciding
/// whether the result is still wanted, is the coordinator's job.
pub(crate) struct ProfileEnrichmentLoader {
    source: Arc<dyn ProfileSource>,
}

impl ProfileEnrichmentLoader {
    pub(crate) fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    /// Load the complete record for `user_id`. Records for another user are
    /// discarded.
    pub(crate) async fn load(&self, user_id: &str, access_token: &str) -> BackendResult<Option<User>> {
        let fetched = self.source.fetch_profile(user_id, access_token).await?;

        match fetched {
            Some(user) if user.id == user_id => {
                debug!(user_id = %user_id, "Profile loaded");
                Ok(Some(user))
            }
            Some(user) => {
                warn!(
                    expected = %user_id,
                    received = %user.id,
                    "Profile source returned another user, ignoring"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::harness::MockProfiles;
    use identity_backend::Profile;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_returns_matching_user() {
        let profiles = Arc::new(MockProfiles::new());
        profiles.set(
            "u1",
            Duration::ZERO,
            Some(User::new("u1").with_profile(Profile {
                bio: Some("hello".into()),
                ..Default::default()
            })),
        );
        let loader = ProfileEnrichmentLoader::new(profiles.clone());

        let user = loader.load("u1", "t1").await.unwrap().unwrap();
        assert_eq!(user.profile.bio.as_deref(), Some("hello"));
        assert_eq!(profiles.calls(), 1);
    }

    #[tokio::test]
    async fn test_load_discards_other_user() {
        let profiles = Arc::new(MockProfiles::new());
        profiles.set("u1", Duration::ZERO, Some(User::new("u2")));
        let loader = ProfileEnrichmentLoader::new(profiles);

        assert!(loader.load("u1", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_propagates_failure() {
        let profiles = Arc::new(MockProfiles::new());
        profiles.fail("u1");
        let loader = ProfileEnrichmentLoader::new(profiles);

        assert!(loader.load("u1", "t1").await.is_err());
    }
}
