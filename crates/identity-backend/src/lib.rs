//! Identity backend capability consumed by the session coordinator.
//!
//! This crate provides:
//! - Session, user, and profile types shared with the coordinator
//! - The `IdentityBackend` and `ProfileSource` traits
//! - A Supabase (GoTrue + PostgREST) implementation of both

mod error;
mod supabase;
mod traits;
mod types;

pub use error::{BackendError, BackendResult};
pub use supabase::SupabaseBackend;
pub use traits::{IdentityBackend, ProfileSource};
pub use types::{Profile, Session, SessionEvent, SignIn, User};
