//! Credential persistence writer.
//!
//! A single actor task owns every write to the credential store. Commands are
//! queued in the order the coordinator issues them and carry the generation
//! of the operation that produced them; a command older than the newest one
//! already accepted is dropped. Within one command every key is written
//! concurrently and a failing key never stops the others.
//!
//! The legacy key migration also runs inside the actor, once, before the
//! first session write or clear, so a migrated value can never land on top
//! of newer credentials.

use crate::migration::{KeyMigrationRunner, MigrationReport};
use credential_store::{CredentialStore, StorageKeys, StorageResult};
use futures_util::future::join_all;
use identity_backend::{Session, User};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Values written for one session generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StorageRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub language: Option<String>,
}

impl StorageRecord {
    pub(crate) fn new(session: &Session, user: &User) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            user_id: session.user_id.clone(),
            language: user
                .profile
                .locale
                .clone()
                .filter(|locale| !locale.trim().is_empty()),
        }
    }

    /// Key writes for this record. `None` removes the key. The language key
    /// is left alone when the record has no language.
    fn writes(&self) -> Vec<(&'static str, Option<&str>)> {
        let mut writes: Vec<(&'static str, Option<&str>)> = StorageKeys::ACCESS_TOKEN_KEYS
            .iter()
            .map(|key| (*key, Some(self.access_token.as_str())))
            .collect();
        writes.push((StorageKeys::USER_ID, Some(self.user_id.as_str())));
        writes.push((StorageKeys::REFRESH_TOKEN, self.refresh_token.as_deref()));
        if let Some(language) = &self.language {
            writes.push((StorageKeys::USER_LANGUAGE, Some(language.as_str())));
        }
        writes
    }
}

/// What happened to a queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// Every key was attempted; `failed` lists the ones that errored.
    Applied { failed: Vec<&'static str> },
    /// A newer generation had already been written.
    StaleGenerationIgnored,
    /// The writer stopped before the command ran.
    Dropped,
}

/// Handle resolving once a command has been processed.
pub(crate) struct Completion(oneshot::Receiver<WriteOutcome>);

impl Completion {
    pub(crate) async fn wait(self) -> WriteOutcome {
        self.0.await.unwrap_or(WriteOutcome::Dropped)
    }
}

/// Resolves once the legacy key migration has run.
pub(crate) struct Migrated(oneshot::Receiver<MigrationReport>);

impl Migrated {
    pub(crate) async fn wait(self) -> MigrationReport {
        self.0.await.unwrap_or_default()
    }
}

enum Command {
    Migrate {
        done: oneshot::Sender<MigrationReport>,
    },
    Persist {
        generation: u64,
        record: StorageRecord,
        done: oneshot::Sender<WriteOutcome>,
    },
    Clear {
        generation: u64,
        done: oneshot::Sender<WriteOutcome>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

/// Queue in front of the writer actor.
pub(crate) struct PersistenceWriter {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PersistenceWriter {
    /// Start the writer actor on the current runtime.
    pub(crate) fn spawn(store: Arc<dyn CredentialStore>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(store, rx));
        Self { commands, task }
    }

    /// Queue a write of every redundant key for `record`.
    pub(crate) fn persist(&self, generation: u64, record: StorageRecord) -> Completion {
        let (done, rx) = oneshot::channel();
        self.send(Command::Persist {
            generation,
            record,
            done,
        });
        Completion(rx)
    }

    /// Queue removal of every session key.
    /// Run the legacy key migration ahead of any later session write.
    pub(crate) fn migrate(&self) -> Migrated {
        let (done, rx) = oneshot::channel();
        self.send(Command::Migrate { done });
        Migrated(rx)
    }

    pub(crate) fn clear(&self, generation: u64) -> Completion {
        let (done, rx) = oneshot::channel();
        self.send(Command::Clear { generation, done });
        Completion(rx)
    }

    /// Wait until every command queued so far has been processed.
    pub(crate) async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        self.send(Command::Flush { done });
        let _ = rx.await;
    }

    /// Stop the actor. Queued commands resolve as `Dropped`.
    pub(crate) fn shutdown(&self) {
        self.task.abort();
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Persistence writer is stopped, command dropped");
        }
    }
}

impl Drop for PersistenceWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_writer(store: Arc<dyn CredentialStore>, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut latest_generation = 0u64;
    let mut migration = Some(KeyMigrationRunner::new(Arc::clone(&store)));
    let mut migration_report = None;

    while let Some(command) = rx.recv().await {
        if !matches!(command, Command::Flush { .. }) {
            if let Some(runner) = migration.take() {
                migration_report = Some(runner.run().await);
            }
        }

        match command {
            Command::Migrate { done } => {
                // A repeat request finds nothing left to migrate.
                let _ = done.send(migration_report.take().unwrap_or_default());
            }
            Command::Persist {
                generation,
                record,
                done,
            } => {
                let outcome = if generation < latest_generation {
                    debug!(generation, latest_generation, "StaleGenerationIgnored: persist");
                    WriteOutcome::StaleGenerationIgnored
                } else {
                    latest_generation = generation;
                    let failed = write_keys(store.as_ref(), &record.writes()).await;
                    info!(
                        generation,
                        user_id = %record.user_id,
                        failed = failed.len(),
                        "Credentials persisted"
                    );
                    WriteOutcome::Applied { failed }
                };
                let _ = done.send(outcome);
            }
            Command::Clear { generation, done } => {
                let outcome = if generation < latest_generation {
                    debug!(generation, latest_generation, "StaleGenerationIgnored: clear");
                    WriteOutcome::StaleGenerationIgnored
                } else {
                    latest_generation = generation;
                    let removals: Vec<_> = StorageKeys::SESSION_KEYS
                        .iter()
                        .map(|key| (*key, None))
                        .collect();
                    let failed = write_keys(store.as_ref(), &removals).await;
                    info!(generation, failed = failed.len(), "Credentials cleared");
                    WriteOutcome::Applied { failed }
                };
                let _ = done.send(outcome);
            }
            Command::Flush { done } => {
                let _ = done.send(());
            }
        }
    }

    debug!("Persistence writer stopped");
}

/// Apply all writes concurrently. Returns the keys that failed.
async fn write_keys(
    store: &dyn CredentialStore,
    writes: &[(&'static str, Option<&str>)],
) -> Vec<&'static str> {
    let results = join_all(writes.iter().map(|(key, value)| async move {
        let result: StorageResult<()> = match value {
            Some(value) => store.set(key, value).await,
            None => store.remove(key).await.map(|_| ()),
        };
        (*key, result)
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(key, result)| match result {
            Ok(()) => None,
            Err(e) => {
                warn!(store = store.name(), key = %key, error = %e, "StorageWriteFailed");
                Some(key)
            }
        })
        .collect()
}
