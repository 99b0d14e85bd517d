//! Authentication phase machine using rust-fsm.
//!
//! The machine tracks which phase the published snapshot is in. The data that
//! travels with a phase (tracked user id, resolution epoch, tenant context)
//! lives beside it in the state machine driver.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   NoSession / SessionEnded   ┌─────────────────┐
//! │  Uninitialized  │ ───────────────────────────► │    SignedOut    │
//! └────────┬────────┘                              └───┬─────────▲───┘
//!          │ ResolveSubject          ResolveSubject    │         │
//!          ▼                  ┌────────────────────────┘         │
//! ┌─────────────────┐ ◄───────┘                                  │
//! │    Resolving    │ ── SessionEnded ───────────────────────────┤
//! └──┬───────────▲──┘                                            │
//!    │           │ ResolveSubject                                │
//!    │ ResolutionCommitted                                       │
//!    ▼           │                                               │
//! ┌─────────────────┐                                            │
//! │      Ready      │ ── SessionEnded ───────────────────────────┘
//! └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Uninitialized)

    Uninitialized => {
        ResolveSubject => Resolving,
        NoSession => SignedOut,
        SessionEnded => SignedOut
    },
    Resolving => {
        // A newer subject supersedes the one in flight
        ResolveSubject => Resolving,
        ResolutionCommitted => Ready,
        SessionEnded => SignedOut
    },
    Ready => {
        ResolveSubject => Resolving,
        SessionEnded => SignedOut
    },
    SignedOut => {
        ResolveSubject => Resolving,
        NoSession => SignedOut,
        SessionEnded => SignedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Public view of the machine state, carried in every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Startup session read has not finished.
    Uninitialized,
    /// Tenant data for the tracked user is being fetched.
    Resolving,
    /// Tenant data for the tracked user is committed.
    Ready,
    /// No session.
    SignedOut,
}

impl AuthPhase {
    /// Consumers should render a loading state in this phase.
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthPhase::Uninitialized | AuthPhase::Resolving)
    }
}

impl From<&AuthMachineState> for AuthPhase {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Uninitialized => AuthPhase::Uninitialized,
            AuthMachineState::Resolving => AuthPhase::Resolving,
            AuthMachineState::Ready => AuthPhase::Ready,
            AuthMachineState::SignedOut => AuthPhase::SignedOut,
        }
    }
}
