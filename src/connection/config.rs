use std::time::Duration;

use crate::proto::MAX_MESSAGE_LENGTH;

/// Tunables of a [`Connection`].
///
/// The defaults suit talking to a local bus; they can be adjusted through
/// [`ConnectionBuilder::config`] or the individual builder methods.
///
/// [`Connection`]: crate::Connection
/// [`ConnectionBuilder::config`]: crate::ConnectionBuilder::config
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum duration for connecting and authenticating combined.
    pub connect_timeout: Duration,
    /// Default deadline for a method call reply.
    pub method_call_timeout: Duration,
    /// Per-operation timeout for reads during the handshake.
    pub read_timeout: Duration,
    /// Per-operation timeout for writes during the handshake.
    pub write_timeout: Duration,
    /// Whether periodic liveness pings run while connected.
    pub health_check_enabled: bool,
    /// Period between liveness pings.
    pub health_check_interval: Duration,
    /// Deadline for a single liveness ping.
    pub health_check_timeout: Duration,
    /// Consecutive failed pings after which the connection is considered
    /// failed.
    pub health_failure_threshold: u32,
    /// Whether the connection reconnects by itself after failing.
    pub auto_reconnect_enabled: bool,
    /// Backoff delay before the first reconnect attempt.
    pub reconnect_initial_delay: Duration,
    /// Cap on the reconnect backoff delay.
    pub reconnect_max_delay: Duration,
    /// Growth factor of the reconnect backoff, at least 1.0.
    pub reconnect_backoff_multiplier: f64,
    /// Reconnect attempts before giving up for good; 0 gives up
    /// immediately.
    pub max_reconnect_attempts: u32,
    /// Method calls allowed in flight before senders are made to wait.
    pub max_in_flight: usize,
    /// Cap on a single message, at most the protocol limit of 2^27.
    pub max_message_bytes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            method_call_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            health_failure_threshold: 3,
            auto_reconnect_enabled: true,
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            reconnect_backoff_multiplier: 2.0,
            max_reconnect_attempts: 10,
            max_in_flight: 1024,
            max_message_bytes: MAX_MESSAGE_LENGTH,
        }
    }
}
