//! Credential storage for the session coordinator.
//!
//! One capability trait, [`CredentialStore`], with two backing stores picked
//! once at construction time:
//! - **Secure**: the OS keychain (`security-framework` on macOS, Secret
//!   Service via `secret-service` on Linux). Only accepts keys made of
//!   `[A-Za-z0-9._-]`.
//! - **Local**: a plain JSON file, the equivalent of browser local storage.
//!   Used where no keychain exists or when selected explicitly.
//!
//! [`MemoryStore`] is a third, process-local implementation for tests and
//! ephemeral runs.

mod keys;
mod local;
mod memory;
mod secure;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

pub use keys::StorageKeys;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use secure::{is_valid_secure_key, SecureStore};
pub use traits::CredentialStore;

use session_config_and_utils::{Paths, StoreBackend};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key contains characters the backend does not accept
    #[error("Key not accepted by this store: {0}")]
    InvalidKey(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// No implementation for the requested backend on this platform
    #[error("Unsupported store backend: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the secure store for the current platform.
pub fn create_secure_store(service_name: &str) -> StorageResult<SecureStore> {
    #[cfg(target_os = "macos")]
    {
        let backend = macos::KeychainBackendImpl::new(service_name);
        Ok(SecureStore::new(Arc::new(backend)))
    }

    #[cfg(target_os = "linux")]
    {
        let backend = linux::SecretServiceBackend::connect(service_name)?;
        Ok(SecureStore::new(Arc::new(backend)))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(StorageError::Unsupported(format!(
            "no secure storage available for this platform (service {service_name})"
        )))
    }
}

/// Create the credential store selected by `backend`.
///
/// `Auto` prefers the secure store and falls back to the local file store
/// when the platform has none or it cannot be reached.
pub fn create_store(
    backend: StoreBackend,
    paths: &Paths,
    service_name: &str,
) -> StorageResult<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match backend {
        StoreBackend::Secure => Arc::new(create_secure_store(service_name)?),
        StoreBackend::Local => Arc::new(LocalStore::new(paths.local_store_file())),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Auto => match create_secure_store(service_name) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(error = %e, "Secure store unavailable, using local store");
                Arc::new(LocalStore::new(paths.local_store_file()))
            }
        },
    };
    info!(store = store.name(), "Credential store ready");
    Ok(store)
}
