//! Connection state machine

use serde::Serialize;

/// Socket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A connect attempt starts
    Connect,
    /// The socket opened
    Open,
    /// The attempt failed or the open socket closed
    Drop,
    /// Explicit disconnect
    Shutdown,
}

impl ConnectionState {
    /// Next state, or `None` when `transition` is not valid from `self`
    pub fn apply(self, transition: Transition) -> Option<Self> {
        use ConnectionState::{Connected, Connecting, Disconnected};

        match (self, transition) {
            (Disconnected, Transition::Connect) => Some(Connecting),
            (Connecting, Transition::Open) => Some(Connected),
            (Connecting | Connected, Transition::Drop) => Some(Disconnected),
            (_, Transition::Shutdown) => Some(Disconnected),
            _ => None,
        }
    }

    /// `Connecting` or `Connected`
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}
