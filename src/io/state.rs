//! Connection state and role flags

use std::fmt;

/// Lifecycle state of a [`ConnectionEndpoint`](crate::io::ConnectionEndpoint)
///
/// Initiator: `Connecting -> ConnectedToRemote -> AbleToSend`, loss returns
/// to `NotInitialized`. Acceptor: `Listening -> WaitingForClient ->
/// ClientConnected -> AbleToSend`, client loss returns to
/// `WaitingForClient`. `close()` passes through `ShuttingDown` and ends in
/// `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NotInitialized,
    Listening,
    WaitingForClient,
    ClientConnected,
    Connecting,
    ConnectedToRemote,
    AbleToSend,
    ShuttingDown,
    Terminated,
}

impl ConnectionState {
    /// Whether a new `listen` or `connect` may start from this state
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            ConnectionState::NotInitialized | ConnectionState::Terminated
        )
    }

    /// Whether an initiator's connection attempt is still unresolved
    pub fn is_establishing(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::ConnectedToRemote
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotInitialized => "not-initialized",
            ConnectionState::Listening => "listening",
            ConnectionState::WaitingForClient => "waiting-for-client",
            ConnectionState::ClientConnected => "client-connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ConnectedToRemote => "connected-to-remote",
            ConnectionState::AbleToSend => "able-to-send",
            ConnectionState::ShuttingDown => "shutting-down",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Role flags of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleFlags {
    /// A server-role listener is bound
    pub listening: bool,
    /// The outgoing connection is established
    pub connected_to_remote: bool,
    /// A client is attached to the listener
    pub client_connected: bool,
    /// A sender is attached and `send` enqueues
    pub able_to_send: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_states() {
        assert!(ConnectionState::NotInitialized.is_idle());
        assert!(ConnectionState::Terminated.is_idle());
        assert!(!ConnectionState::AbleToSend.is_idle());
    }

    #[test]
    fn test_establishing_states() {
        assert!(ConnectionState::Connecting.is_establishing());
        assert!(ConnectionState::ConnectedToRemote.is_establishing());
        assert!(!ConnectionState::AbleToSend.is_establishing());
        assert_eq!(ConnectionState::WaitingForClient.to_string(), "waiting-for-client");
    }
}
