//! Integration tests for the auth state machine.
//!
//! - `harness.rs`     - Mock identity provider, mock tenant directory, wait helpers
//! - `startup.rs`     - Startup session read, failures, events that beat it
//! - `stale.rs`       - Superseded resolutions never commit
//! - `events.rs`      - Same-subject events and provider-driven sign-in
//! - `tenant_data.rs` - Missing or failing tenant data, reload, role derivation
//! - `sign_out.rs`    - Local sign-out ordering and provider failures
//! - `lifecycle.rs`   - Shutdown and drop
//! - `resolver.rs`    - ProfileResolver against the mock directory

mod resolver;
mod sign_out;
