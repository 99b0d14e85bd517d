//! Session and authorization state for the voice dashboard.
//!
//! This crate provides:
//! - A `SessionStore` adapter over an external identity provider
//! - A `ProfileResolver` that turns a user id into profile, organization and roles
//! - An explicit FSM-backed `AuthStateMachine` publishing one consistent snapshot
//! - Capability flags and route-guard decisions derived from that snapshot
//! - Supabase implementations of the identity provider and tenant directory

mod auth_fsm;
mod capability;
mod error;
mod guard;
mod profile_resolver;
mod session_store;
mod state_machine;
pub mod supabase;
mod types;

#[cfg(test)]
mod tests;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthPhase};
pub use capability::Capabilities;
pub use error::{AuthError, AuthResult, DirectoryError, ProviderError, ResolveError};
pub use guard::{authorize, Access, Requirement};
pub use profile_resolver::{ProfileResolver, TenantDirectory};
pub use session_store::{
    AuthChange, IdentityProvider, SessionEvent, SessionStore, SessionSubscription,
};
pub use state_machine::{AuthCore, AuthInput, AuthSnapshot, AuthStateMachine, ResolveTicket};
pub use types::{Organization, Profile, Role, Session, SignUpMetadata, TenantContext, User};
