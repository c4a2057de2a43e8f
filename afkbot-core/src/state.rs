//! src/state.rs
//!
//! The per-account connection state machine. This is the single source of
//! truth for connectivity; `is_online` and friends are derived from it.
//! Every edge below is the complete transition table; anything else is
//! rejected, never silently skipped.

use uuid::Uuid;

use afkbot_common::models::connection::ConnectionState;

use crate::Error;

/// Inputs that drive the machine. `will_retry` carries the auto-reconnect
/// decision (toggle enabled and attempts remaining) made by the
/// supervisor at the moment the event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateInput {
    Connect,
    HandshakeSucceeded,
    HandshakeFailed { will_retry: bool },
    PeerLost { will_retry: bool },
    WorldChanged,
    Disconnect,
    TeardownComplete,
    RetriesExhausted,
}

#[derive(Debug)]
pub struct ConnectionStateMachine {
    account_id: Uuid,
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply one input, returning the new state, or an error when the
    /// edge does not exist in the transition table.
    pub fn apply(&mut self, input: StateInput) -> Result<ConnectionState, Error> {
        use ConnectionState::*;

        let next = match (self.state, input) {
            (Disconnected | Failed, StateInput::Connect) => Connecting,
            (Connecting | Connected | Reconnecting | Disconnecting, StateInput::Connect) => {
                return Err(Error::AlreadyInProgress(self.account_id));
            }

            (Connecting | Reconnecting, StateInput::HandshakeSucceeded) => Connected,

            (Connecting | Reconnecting, StateInput::HandshakeFailed { will_retry: true }) => {
                Reconnecting
            }
            (Connecting | Reconnecting, StateInput::HandshakeFailed { will_retry: false }) => {
                Failed
            }

            (Connected, StateInput::PeerLost { will_retry: true }) => Reconnecting,
            (Connected, StateInput::PeerLost { will_retry: false }) => Disconnected,

            (Connected, StateInput::WorldChanged) => Connected,

            // Disconnect is accepted from any state so teardown stays
            // idempotent.
            (_, StateInput::Disconnect) => Disconnecting,
            (Disconnecting, StateInput::TeardownComplete) => Disconnected,

            (Reconnecting, StateInput::RetriesExhausted) => Failed,

            (state, input) => {
                return Err(Error::InvalidTransition(format!(
                    "{:?} in state {}",
                    input, state
                )));
            }
        };

        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    fn machine_in(state: ConnectionState) -> ConnectionStateMachine {
        let mut m = ConnectionStateMachine::new(Uuid::new_v4());
        m.state = state;
        m
    }

    #[test]
    fn connect_only_from_terminal_states() {
        assert_eq!(machine_in(Disconnected).apply(StateInput::Connect).unwrap(), Connecting);
        assert_eq!(machine_in(Failed).apply(StateInput::Connect).unwrap(), Connecting);

        for state in [Connecting, Connected, Reconnecting, Disconnecting] {
            assert!(matches!(
                machine_in(state).apply(StateInput::Connect),
                Err(Error::AlreadyInProgress(_))
            ));
        }
    }

    #[test]
    fn handshake_outcomes() {
        assert_eq!(
            machine_in(Connecting).apply(StateInput::HandshakeSucceeded).unwrap(),
            Connected
        );
        assert_eq!(
            machine_in(Reconnecting).apply(StateInput::HandshakeSucceeded).unwrap(),
            Connected
        );
        assert_eq!(
            machine_in(Connecting)
                .apply(StateInput::HandshakeFailed { will_retry: true })
                .unwrap(),
            Reconnecting
        );
        assert_eq!(
            machine_in(Connecting)
                .apply(StateInput::HandshakeFailed { will_retry: false })
                .unwrap(),
            Failed
        );
        assert!(machine_in(Connected).apply(StateInput::HandshakeSucceeded).is_err());
    }

    #[test]
    fn peer_loss_and_world_change() {
        assert_eq!(
            machine_in(Connected)
                .apply(StateInput::PeerLost { will_retry: true })
                .unwrap(),
            Reconnecting
        );
        assert_eq!(
            machine_in(Connected)
                .apply(StateInput::PeerLost { will_retry: false })
                .unwrap(),
            Disconnected
        );
        // World change is a self-transition and only valid while connected.
        assert_eq!(machine_in(Connected).apply(StateInput::WorldChanged).unwrap(), Connected);
        assert!(machine_in(Reconnecting).apply(StateInput::WorldChanged).is_err());
    }

    #[test]
    fn disconnect_is_accepted_everywhere() {
        for state in [Disconnected, Connecting, Connected, Reconnecting, Disconnecting, Failed] {
            let mut m = machine_in(state);
            assert_eq!(m.apply(StateInput::Disconnect).unwrap(), Disconnecting);
            assert_eq!(m.apply(StateInput::TeardownComplete).unwrap(), Disconnected);
        }
    }

    #[test]
    fn retries_exhausted_only_while_reconnecting() {
        assert_eq!(
            machine_in(Reconnecting).apply(StateInput::RetriesExhausted).unwrap(),
            Failed
        );
        assert!(machine_in(Connected).apply(StateInput::RetriesExhausted).is_err());
    }
}
