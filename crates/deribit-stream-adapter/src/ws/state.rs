/*
[INPUT]:  Transport lifecycle events (open, auth reply, close, failure)
[OUTPUT]: Current connection state
[POS]:    WebSocket layer - connection state machine
[UPDATE]: When adding lifecycle states or changing transitions
*/

use std::fmt;

/// `Disconnected -> Connecting -> Connected -> Authenticating -> Ready -> Closing -> Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Closing,
}

impl ConnectionState {
    /// Handshake completed and the socket is still usable
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticating | ConnectionState::Ready
        )
    }

    /// `connect()` is a no-op in these states
    pub fn is_active(self) -> bool {
        self == ConnectionState::Connecting || self.is_open()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
