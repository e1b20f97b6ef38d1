//! Configuration, paths, logging, and shared error types for the session coordinator.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, StoreBackend, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogConfig};
pub use paths::Paths;
