//! Integration tests for the session coordinator.
//!
//! - `harness.rs`    - Mock backend, profile source, faulty store, wiring
//! - `bootstrap.rs`  - Restore at startup: lookup, timeout, cached token
//! - `sign_in.rs`    - Sign-in, persistence fan-out, enrichment, timer
//! - `sign_out.rs`   - Sign-out always clears locally
//! - `events.rs`     - Backend session events after bootstrap
//! - `generation.rs` - Out-of-order completions and supersession

mod generation;
mod sign_out;
