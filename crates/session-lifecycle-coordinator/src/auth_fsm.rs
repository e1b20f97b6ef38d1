//! Session state machine using rust-fsm.
//!
//! The machine only tracks the phase. The session and user that belong to the
//! `Authenticated` phase are held next to it by the coordinator and swapped in
//! the same critical section as the transition.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   BootstrapStarted   ┌─────────────────┐
//! │ Unauthenticated │ ───────────────────► │    Restoring    │
//! │    (initial)    │ ◄─────────────────── │   (once only)   │
//! └────────┬────────┘    NoSessionFound    └────────┬────────┘
//!          │                                        │
//!          │ SignedIn                               │ SessionRestored / SignedIn
//!          ▼                                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Authenticated                         │ ◄─┐ SignedIn
//! └────────┬──────────────────────────────────────────┬─────────┘ ──┘ SessionReplaced
//!          │ SignOutRequested                         │               UserUpdated
//!          ▼                                          │ SessionCleared
//! ┌─────────────────┐   SignOutComplete               ▼
//! │   SigningOut    │ ────────────────────►  Unauthenticated
//! └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Generates `session_machine::{State, Input, StateMachine}`.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        BootstrapStarted => Restoring,
        SignedIn => Authenticated,
        SignOutRequested => SigningOut
    },
    Restoring => {
        // Backend lookup or cached token produced a session
        SessionRestored => Authenticated,
        NoSessionFound => Unauthenticated,
        // A sign-in raced the bootstrap and won
        SignedIn => Authenticated,
        SignOutRequested => SigningOut
    },
    Authenticated => {
        // Different user signed in on top
        SignedIn => Authenticated,
        // Same user, new tokens
        SessionReplaced => Authenticated,
        // Profile merged into the installed user
        UserUpdated => Authenticated,
        SignOutRequested => SigningOut,
        // Backend reported that no session exists any more
        SessionCleared => Unauthenticated
    },
    SigningOut => {
        SignOutRequested => SigningOut,
        SignOutComplete => Unauthenticated,
        // A sign-in initiated after the sign-out overtook it
        SignedIn => Authenticated
    }
}

pub(crate) use session_machine::Input as MachineInput;
pub(crate) use session_machine::State as MachineState;
pub(crate) use session_machine::StateMachine as SessionMachine;

/// Data-free view of the authentication state, for logs and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Unauthenticated,
    Restoring,
    Authenticated,
    SigningOut,
}

impl AuthPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPhase::Unauthenticated => "unauthenticated",
            AuthPhase::Restoring => "restoring",
            AuthPhase::Authenticated => "authenticated",
            AuthPhase::SigningOut => "signing_out",
        }
    }
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&MachineState> for AuthPhase {
    fn from(state: &MachineState) -> Self {
        match state {
            MachineState::Unauthenticated => AuthPhase::Unauthenticated,
            MachineState::Restoring => AuthPhase::Restoring,
            MachineState::Authenticated => AuthPhase::Authenticated,
            MachineState::SigningOut => AuthPhase::SigningOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unauthenticated() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), MachineState::Unauthenticated);
    }

    #[test]
    fn test_bootstrap_restores_session() {
        let mut machine = SessionMachine::new();

        machine.consume(&MachineInput::BootstrapStarted).unwrap();
        assert_eq!(*machine.state(), MachineState::Restoring);

        machine.consume(&MachineInput::SessionRestored).unwrap();
        assert_eq!(*machine.state(), MachineState::Authenticated);
    }

    #[test]
    fn test_bootstrap_without_session() {
        let mut machine = SessionMachine::new();

        machine.consume(&MachineInput::BootstrapStarted).unwrap();
        machine.consume(&MachineInput::NoSessionFound).unwrap();
        assert_eq!(*machine.state(), MachineState::Unauthenticated);
    }

    #[test]
    fn test_restoring_is_entered_only_from_unauthenticated() {
        let mut machine = SessionMachine::new();
        machine.consume(&MachineInput::SignedIn).unwrap();

        assert!(machine.consume(&MachineInput::BootstrapStarted).is_err());
        assert_eq!(*machine.state(), MachineState::Authenticated);
    }

    #[test]
    fn test_sign_out_flow() {
        let mut machine = SessionMachine::new();
        machine.consume(&MachineInput::SignedIn).unwrap();

        machine.consume(&MachineInput::SignOutRequested).unwrap();
        assert_eq!(*machine.state(), MachineState::SigningOut);

        machine.consume(&MachineInput::SignOutComplete).unwrap();
        assert_eq!(*machine.state(), MachineState::Unauthenticated);
    }

    #[test]
    fn test_authenticated_self_transitions() {
        let mut machine = SessionMachine::new();
        machine.consume(&MachineInput::SignedIn).unwrap();

        for input in [
            MachineInput::SessionReplaced,
            MachineInput::UserUpdated,
            MachineInput::SignedIn,
        ] {
            machine.consume(&input).unwrap();
            assert_eq!(*machine.state(), MachineState::Authenticated);
        }
    }

    #[test]
    fn test_session_replaced_requires_authenticated() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&MachineInput::SessionReplaced).is_err());
        assert!(machine.consume(&MachineInput::SessionCleared).is_err());
        assert!(machine.consume(&MachineInput::SignOutComplete).is_err());
    }

    #[test]
    fn test_sign_in_overtakes_sign_out() {
        let mut machine = SessionMachine::new();
        machine.consume(&MachineInput::SignOutRequested).unwrap();
        machine.consume(&MachineInput::SignedIn).unwrap();
        assert_eq!(*machine.state(), MachineState::Authenticated);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(AuthPhase::from(&MachineState::SigningOut), AuthPhase::SigningOut);
        assert_eq!(AuthPhase::Authenticated.to_string(), "authenticated");
        assert_eq!(
            serde_json::to_string(&AuthPhase::SigningOut).unwrap(),
            "\"signing_out\""
        );
    }
}
