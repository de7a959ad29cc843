//! Connection lifecycle status.

use serde::{Deserialize, Serialize};

use super::StateMachine;

/// Lifecycle of one client connection.
///
/// ```text
/// Connecting ──► Open ──► Closing ──► Closed
///      │                     ▲
///      └─────────────────────┘
/// ```
///
/// Once `Closing` begins the connection is no longer reachable from the
/// registry and refuses further writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgraded but not yet registered.
    Connecting = 0,
    /// Registered and eligible for broadcasts.
    Open = 1,
    /// Teardown started after a read or write error.
    Closing = 2,
    /// Socket closed and registry entry removed.
    Closed = 3,
}

impl ConnectionState {
    /// True while writes may still be attempted.
    pub fn accepts_writes(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Decodes the compact representation used for atomic storage.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ConnectionState::Connecting),
            1 => Some(ConnectionState::Open),
            2 => Some(ConnectionState::Closing),
            3 => Some(ConnectionState::Closed),
            _ => None,
        }
    }

    /// Compact representation used for atomic storage.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Connecting => vec![Open, Closing],
            Open => vec![Closing],
            Closing => vec![Closed],
            Closed => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConnectionState; 4] = [
        ConnectionState::Connecting,
        ConnectionState::Open,
        ConnectionState::Closing,
        ConnectionState::Closed,
    ];

    #[test]
    fn happy_path_is_valid() {
        let state = ConnectionState::Connecting
            .transition_to(ConnectionState::Open)
            .and_then(|s| s.transition_to(ConnectionState::Closing))
            .and_then(|s| s.transition_to(ConnectionState::Closed));
        assert_eq!(state, Ok(ConnectionState::Closed));
    }

    #[test]
    fn closing_cannot_reopen() {
        assert!(ConnectionState::Closing
            .transition_to(ConnectionState::Open)
            .is_err());
    }

    #[test]
    fn closed_is_terminal() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
    }

    #[test]
    fn only_pre_teardown_states_accept_writes() {
        assert!(ConnectionState::Connecting.accepts_writes());
        assert!(ConnectionState::Open.accepts_writes());
        assert!(!ConnectionState::Closing.accepts_writes());
        assert!(!ConnectionState::Closed.accepts_writes());
    }

    #[test]
    fn u8_representation_round_trips_for_every_state() {
        for state in ALL {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), Some(state));
        }
        assert_eq!(ConnectionState::from_u8(42), None);
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for state in ALL {
            for target in ALL {
                assert_eq!(
                    state.can_transition_to(&target),
                    state.valid_transitions().contains(&target),
                    "{:?} -> {:?}",
                    state,
                    target
                );
            }
        }
    }
}
