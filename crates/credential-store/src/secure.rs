//! Keychain-backed credential store.
//!
//! Platform keychains are blocking APIs, so each call runs on tokio's
//! blocking pool. Keys are validated up front: the keychain only accepts
//! `[A-Za-z0-9._-]`, and anything else is rejected with
//! [`StorageError::InvalidKey`] instead of being silently dropped.

use crate::{CredentialStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Blocking primitives each platform keychain provides.
pub(crate) trait KeychainBackend: Send + Sync + 'static {
    fn read(&self, key: &str) -> StorageResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;
    fn erase(&self, key: &str) -> StorageResult<bool>;
}

/// Returns true if `key` is accepted by the secure store.
pub fn is_valid_secure_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Credential store on top of the OS keychain.
#[derive(Clone)]
pub struct SecureStore {
    backend: Arc<dyn KeychainBackend>,
}

impl SecureStore {
    pub(crate) fn new(backend: Arc<dyn KeychainBackend>) -> Self {
        Self { backend }
    }

    async fn run_blocking<T, F>(&self, key: &str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeychainBackend, &str) -> StorageResult<T> + Send + 'static,
    {
        if !is_valid_secure_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let backend = self.backend.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || op(backend.as_ref(), &key))
            .await
            .map_err(|e| StorageError::Platform(format!("keychain task failed: {e}")))?
    }
}

#[async_trait]
impl CredentialStore for SecureStore {
    fn name(&self) -> &'static str {
        "secure"
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.run_blocking(key, |backend, key| backend.read(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let value = value.to_string();
        self.run_blocking(key, move |backend, key| backend.write(key, &value))
            .await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.run_blocking(key, |backend, key| backend.erase(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeKeychain {
        items: Mutex<HashMap<String, String>>,
    }

    impl KeychainBackend for FakeKeychain {
        fn read(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.items.lock().unwrap().get(key).cloned())
        }

        fn write(&self, key: &str, value: &str) -> StorageResult<()> {
            self.items
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn erase(&self, key: &str) -> StorageResult<bool> {
            Ok(self.items.lock().unwrap().remove(key).is_some())
        }
    }

    fn store() -> SecureStore {
        SecureStore::new(Arc::new(FakeKeychain::default()))
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_secure_key("auth_token"));
        assert!(is_valid_secure_key("userToken"));
        assert!(is_valid_secure_key("a.b-c_d"));
        assert!(!is_valid_secure_key("@auth_token"));
        assert!(!is_valid_secure_key("with space"));
        assert!(!is_valid_secure_key(""));
    }

    #[tokio::test]
    async fn test_round_trip_through_blocking_pool() {
        let store = store();
        store.set("access_token", "abc").await.unwrap();
        assert_eq!(
            store.get("access_token").await.unwrap(),
            Some("abc".to_string())
        );
        assert!(store.remove("access_token").await.unwrap());
        assert!(!store.has("access_token").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_legacy_style_keys() {
        let store = store();
        let err = store.set("@onboarding_complete", "true").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(matches!(
            store.get("@onboarding_complete").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
