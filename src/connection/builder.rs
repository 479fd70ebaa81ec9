use crate::error::Result;
use crate::sasl::{Anonymous, AuthMechanism, CookieSha1, External, Mechanism};
use crate::transport::{Address, Transport};

use super::{Config, Connection};

enum BusKind {
    Session,
    System,
    Address(Address),
}

/// Builder of a [`Connection`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use busline::{Config, ConnectionBuilder};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> busline::Result<()> {
/// let c = ConnectionBuilder::new()
///     .session_bus()
///     .config(Config {
///         method_call_timeout: Duration::from_secs(5),
///         ..Config::default()
///     })
///     .build()?;
///
/// c.connect().await?;
/// # Ok(()) }
/// ```
pub struct ConnectionBuilder {
    bus: BusKind,
    config: Config,
    mechanisms: Option<Vec<AuthMechanism>>,
}

impl ConnectionBuilder {
    /// Construct a new [`ConnectionBuilder`] with the default
    /// configuration, aimed at the session bus.
    pub fn new() -> Self {
        Self {
            bus: BusKind::Session,
            config: Config::default(),
            mechanisms: None,
        }
    }

    /// Connect to the session bus (default).
    pub fn session_bus(mut self) -> Self {
        self.bus = BusKind::Session;
        self
    }

    /// Connect to the system bus.
    pub fn system_bus(mut self) -> Self {
        self.bus = BusKind::System;
        self
    }

    /// Connect to an explicit [`Address`].
    pub fn address(mut self, address: Address) -> Self {
        self.bus = BusKind::Address(address);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Restrict authentication to the given mechanisms, tried in order.
    ///
    /// The default depends on the transport: Unix sockets try EXTERNAL
    /// then DBUS_COOKIE_SHA1, TCP tries DBUS_COOKIE_SHA1 then ANONYMOUS.
    pub fn auth_mechanisms(mut self, mechanisms: &[AuthMechanism]) -> Self {
        self.mechanisms = Some(mechanisms.to_vec());
        self
    }

    /// Construct the [`Connection`], resolving the bus address.
    ///
    /// The connection starts out DISCONNECTED; call
    /// [`Connection::connect`] to establish it. Must be called within a
    /// Tokio runtime.
    pub fn build(self) -> Result<Connection> {
        let address = match self.bus {
            BusKind::Session => Address::session_bus()?,
            BusKind::System => Address::system_bus()?,
            BusKind::Address(address) => address,
        };

        Ok(Connection::new(self.config, address, self.mechanisms))
    }
}

impl Default for ConnectionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Instantiate the mechanism list for a freshly connected transport.
pub(super) fn build_mechanisms(
    selected: Option<&[AuthMechanism]>,
    transport: &Transport,
) -> Vec<Box<dyn Mechanism>> {
    let defaults: &[AuthMechanism] = if transport.supports_fd_passing() {
        &[AuthMechanism::External, AuthMechanism::CookieSha1]
    } else {
        &[AuthMechanism::CookieSha1, AuthMechanism::Anonymous]
    };

    let selected = selected.unwrap_or(defaults);

    selected
        .iter()
        .filter_map(|mechanism| -> Option<Box<dyn Mechanism>> {
            match mechanism {
                #[cfg(unix)]
                AuthMechanism::External => Some(Box::new(External::from_current_uid())),
                #[cfg(not(unix))]
                AuthMechanism::External => None,
                AuthMechanism::CookieSha1 => Some(Box::new(CookieSha1::new())),
                AuthMechanism::Anonymous => Some(Box::new(Anonymous)),
            }
        })
        .collect()
}
