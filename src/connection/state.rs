use std::fmt;

/// The lifecycle state of a [`Connection`].
///
/// ```text
/// DISCONNECTED -> CONNECTING -> AUTHENTICATING -> CONNECTED
///      ^                                        (UNHEALTHY <-> CONNECTED)
///      |                                              |
///      +------------ FAILED <-> RECONNECTING <--------+
/// ```
///
/// [`Connection`]: crate::Connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No transport; the initial and final state.
    Disconnected,
    /// The transport is being established.
    Connecting,
    /// The SASL handshake is in progress.
    Authenticating,
    /// Messages flow.
    Connected,
    /// Liveness pings are failing but the transport is still up; sends are
    /// still accepted.
    Unhealthy,
    /// A reconnect attempt is scheduled or running.
    Reconnecting,
    /// The connection is down; reconnection may still be attempted.
    Failed,
}

impl ConnectionState {
    /// Whether sends are accepted in this state.
    pub(crate) fn sendable(self) -> bool {
        matches!(self, Self::Connected | Self::Unhealthy)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Connected => "CONNECTED",
            Self::Unhealthy => "UNHEALTHY",
            Self::Reconnecting => "RECONNECTING",
            Self::Failed => "FAILED",
        };

        f.write_str(name)
    }
}
