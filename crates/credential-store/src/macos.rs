//! macOS Keychain backend.

use crate::secure::KeychainBackend;
use crate::{StorageError, StorageResult};
use security_framework::item::{ItemClass, ItemSearchOptions, Limit, SearchResult};
use security_framework::passwords::{delete_generic_password, set_generic_password};
use tracing::debug;

/// errSecItemNotFound
const ERR_ITEM_NOT_FOUND: i32 = -25300;

/// Generic-password items under one keychain service.
pub(crate) struct KeychainBackendImpl {
    service_name: String,
}

impl KeychainBackendImpl {
    pub(crate) fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }
}

impl KeychainBackend for KeychainBackendImpl {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Reading keychain item");

        let mut search = ItemSearchOptions::new();
        search
            .class(ItemClass::generic_password())
            .service(&self.service_name)
            .account(key)
            .limit(Limit::Max(1))
            .load_data(true);

        let results = match search.search() {
            Ok(results) => results,
            Err(e) if e.code() == ERR_ITEM_NOT_FOUND => return Ok(None),
            Err(e) => {
                return Err(StorageError::Platform(format!(
                    "Failed to read keychain item: {e}"
                )))
            }
        };

        match results.into_iter().next() {
            Some(SearchResult::Data(data)) => String::from_utf8(data)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            _ => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing keychain item");

        // set_generic_password updates in place when the item exists.
        set_generic_password(&self.service_name, key, value.as_bytes())
            .map_err(|e| StorageError::Platform(format!("Failed to write keychain item: {e}")))
    }

    fn erase(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ERR_ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete keychain item: {e}"
            ))),
        }
    }
}
