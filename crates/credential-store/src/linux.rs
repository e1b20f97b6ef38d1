//! Linux Secret Service backend (GNOME Keyring / KWallet).

use crate::secure::KeychainBackend;
use crate::{StorageError, StorageResult};
use secret_service::blocking::{Collection, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// Items in the default collection tagged with `service` and `key` attributes.
pub(crate) struct SecretServiceBackend {
    service_name: String,
}

fn platform_err(context: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Platform(format!("{context}: {e}"))
}

impl SecretServiceBackend {
    /// Verify the Secret Service is reachable before handing out a backend.
    pub(crate) fn connect(service_name: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh)
            .map_err(|e| platform_err("Failed to connect to Secret Service", e))?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service_name.as_str()), ("key", key)])
    }

    fn with_collection<T>(
        &self,
        f: impl FnOnce(&Collection<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let ss = SecretService::connect(EncryptionType::Dh)
            .map_err(|e| platform_err("Failed to connect to Secret Service", e))?;
        let collection = ss
            .get_default_collection()
            .map_err(|e| platform_err("No default collection", e))?;

        if collection.is_locked().unwrap_or(false) {
            collection
                .unlock()
                .map_err(|e| platform_err("Failed to unlock collection", e))?;
        }

        f(&collection)
    }
}

impl KeychainBackend for SecretServiceBackend {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Reading secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.attributes(key))
                .map_err(|e| platform_err("Secret search failed", e))?;

            let Some(item) = items.first() else {
                return Ok(None);
            };
            let secret = item
                .get_secret()
                .map_err(|e| platform_err("Failed to read secret", e))?;
            String::from_utf8(secret)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string()))
        })
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing secret");

        self.with_collection(|collection| {
            let label = format!("{}/{}", self.service_name, key);
            collection
                .create_item(&label, self.attributes(key), value.as_bytes(), true, "text/plain")
                .map_err(|e| platform_err("Failed to write secret", e))?;
            Ok(())
        })
    }

    fn erase(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.attributes(key))
                .map_err(|e| platform_err("Secret search failed", e))?;

            let mut removed = false;
            for item in &items {
                item.delete()
                    .map_err(|e| platform_err("Failed to delete secret", e))?;
                removed = true;
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "com.session-coordinator.test";

    #[test]
    #[ignore] // Requires Linux Secret Service (D-Bus)
    fn test_secret_service_operations() {
        let backend = SecretServiceBackend::connect(TEST_SERVICE).unwrap();
        let _ = backend.erase("test_key");

        backend.write("test_key", "first").unwrap();
        backend.write("test_key", "second").unwrap();
        assert_eq!(backend.read("test_key").unwrap(), Some("second".to_string()));

        assert!(backend.erase("test_key").unwrap());
        assert!(!backend.erase("test_key").unwrap());
        assert_eq!(backend.read("test_key").unwrap(), None);
    }
}
