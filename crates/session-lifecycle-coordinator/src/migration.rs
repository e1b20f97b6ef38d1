//! One-shot rewrite of legacy storage keys.
//!
//! Older clients stored a few values under `@`-prefixed names. The runner
//! copies each one to its current name (never overwriting a current value)
//! and deletes the legacy entry. It is safe to run on every start.

use credential_store::{CredentialStore, StorageError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `(legacy, current)` key pairs. Legacy names are only known here.
const LEGACY_KEYS: [(&str, &str); 3] = [
    ("@auth_token", "auth_token"),
    ("@onboarding_complete", "onboarding_complete"),
    ("@communities_complete", "communities_complete"),
];

/// Summary of one migration pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy values copied to their current key.
    pub copied: usize,
    /// Legacy entries deleted (copied or superseded).
    pub removed: usize,
    /// Pairs the store refused to handle.
    pub skipped: usize,
}

pub struct KeyMigrationRunner {
    store: Arc<dyn CredentialStore>,
}

impl KeyMigrationRunner {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Migrate every legacy pair. Failures are logged, never returned.
    pub async fn run(&self) -> MigrationReport {
        let mut report = MigrationReport::default();

        for (legacy, current) in LEGACY_KEYS {
            match self.migrate_pair(legacy, current).await {
                Ok(Some(copied)) => {
                    report.removed += 1;
                    if copied {
                        report.copied += 1;
                    }
                }
                Ok(None) => {}
                Err(StorageError::InvalidKey(_)) => {
                    debug!(
                        store = self.store.name(),
                        key = legacy,
                        "Store rejects legacy key name, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(key = legacy, error = %e, "Legacy key migration failed");
                    report.skipped += 1;
                }
            }
        }

        if report.removed > 0 {
            info!(
                copied = report.copied,
                removed = report.removed,
                "Legacy storage keys migrated"
            );
        }
        report
    }

    /// `Ok(None)` when there is nothing under `legacy`, otherwise whether the
    /// value was copied.
    async fn migrate_pair(&self, legacy: &str, current: &str) -> Result<Option<bool>, StorageError> {
        let Some(value) = self.store.get(legacy).await? else {
            return Ok(None);
        };

        let copied = if self.store.get(current).await?.is_none() {
            self.store.set(current, &value).await?;
            true
        } else {
            false
        };

        self.store.remove(legacy).await?;
        Ok(Some(copied))
    }
}
