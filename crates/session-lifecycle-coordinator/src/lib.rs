//! Session lifecycle coordination.
//!
//! [`SessionCoordinator`] establishes, persists, restores, and tears down the
//! authenticated session of a client talking to a remote identity backend.
//!
//! ```text
//! SessionCoordinator ──► IdentityBackend (lookup, sign-in/out, events)
//!        │           ──► ProfileEnrichmentLoader ──► ProfileSource
//!        │           ──► PersistenceWriter ──► CredentialStore
//!        │                     └──► KeyMigrationRunner (once, before writes)
//!        └──────────────► SideEffectScheduler
//! ```

mod auth_fsm;
mod config;
mod coordinator;
mod enrichment;
mod error;
mod migration;
mod persistence;
mod scheduler;
mod state;
mod subscription;

#[cfg(test)]
mod tests;

pub use auth_fsm::AuthPhase;
pub use config::CoordinatorConfig;
pub use coordinator::SessionCoordinator;
pub use error::{AuthError, AuthResult};
pub use migration::{KeyMigrationRunner, MigrationReport};
pub use scheduler::{SideEffectCallback, SideEffectScheduler};
pub use state::AuthState;
pub use subscription::Subscription;
