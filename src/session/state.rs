use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportMode;

/// Recording session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    /// Batch only: a finished recording waits to be submitted or discarded
    Reviewing,
    /// Waiting for the server's verdict
    Sending,
    /// The server asked for another recording
    AutoPending,
    Completed,
    Error,
}

impl SessionState {
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::AutoPending)
    }

    /// The session has nothing left to do until it is reset
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error)
    }

    pub fn can_reset(self) -> bool {
        self.is_terminal()
    }

    /// Whether `self -> next` is an edge of the session state machine in `mode`
    pub fn can_transition_to(self, next: SessionState, mode: TransportMode) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle | AutoPending, Recording) => true,
            (Recording, Reviewing) => mode == TransportMode::Batch,
            (Recording, Sending) => mode == TransportMode::Streaming,
            (Recording, Error) => mode == TransportMode::Streaming,
            (Reviewing, Sending | Idle) => mode == TransportMode::Batch,
            (Sending, Reviewing) => mode == TransportMode::Batch,
            (Sending, AutoPending | Completed | Error) => true,
            (Completed | Error, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Reviewing => "reviewing",
            SessionState::Sending => "sending",
            SessionState::AutoPending => "auto_pending",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 7] = [Idle, Recording, Reviewing, Sending, AutoPending, Completed, Error];

    #[test]
    fn test_batch_edges() {
        let mode = TransportMode::Batch;
        assert!(Idle.can_transition_to(Recording, mode));
        assert!(Recording.can_transition_to(Reviewing, mode));
        assert!(Reviewing.can_transition_to(Sending, mode));
        assert!(Reviewing.can_transition_to(Idle, mode));
        assert!(Sending.can_transition_to(AutoPending, mode));
        assert!(Sending.can_transition_to(Completed, mode));
        assert!(Sending.can_transition_to(Error, mode));
        assert!(AutoPending.can_transition_to(Recording, mode));

        assert!(!Recording.can_transition_to(Sending, mode));
        assert!(!Recording.can_transition_to(Error, mode));
    }

    #[test]
    fn test_streaming_skips_review() {
        let mode = TransportMode::Streaming;
        assert!(Recording.can_transition_to(Sending, mode));
        assert!(Recording.can_transition_to(Error, mode));
        assert!(!Recording.can_transition_to(Reviewing, mode));
        assert!(!Reviewing.can_transition_to(Sending, mode));
    }

    #[test]
    fn test_terminal_states_only_reset() {
        for mode in [TransportMode::Batch, TransportMode::Streaming] {
            for terminal in ALL.into_iter().filter(|state| state.is_terminal()) {
                for next in ALL {
                    assert_eq!(
                        terminal.can_transition_to(next, mode),
                        next == Idle,
                        "{} -> {} in {} mode",
                        terminal,
                        next,
                        mode
                    );
                }
            }
        }
    }

    #[test]
    fn test_no_self_loops() {
        for mode in [TransportMode::Batch, TransportMode::Streaming] {
            for state in ALL {
                assert!(!state.can_transition_to(state, mode));
            }
        }
    }

    #[test]
    fn test_start_and_reset_guards() {
        assert!(Idle.can_start());
        assert!(AutoPending.can_start());
        assert!(!Recording.can_start());
        assert!(!Completed.can_start());

        assert!(Completed.can_reset());
        assert!(Error.can_reset());
        assert!(!Idle.can_reset());
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ALL.into_iter().filter(|state| state.is_terminal()).collect();
        assert_eq!(terminal, vec![Completed, Error]);
    }
}
