//! Storage trait definitions.

use crate::StorageResult;
use async_trait::async_trait;

/// Uniform key-value capability over every credential store backend.
///
/// Every method is a suspension point; implementations that wrap blocking
/// platform APIs move the work off the async executor.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Retrieve a value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Returns whether something was removed.
    async fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove every key in `keys`.
    ///
    /// All keys are attempted even when one fails; the first error is
    /// returned afterwards.
    async fn clear(&self, keys: &[&str]) -> StorageResult<()> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.remove(key).await {
                tracing::warn!(store = self.name(), key = %key, error = %e, "Failed to remove key");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
