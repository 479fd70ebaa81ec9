use std::env;
use std::fmt;

use crate::error::{Error, ErrorKind, Result};

const ENV_STARTER_ADDRESS: &str = "DBUS_STARTER_ADDRESS";
const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// A parsed D-Bus server address.
///
/// An address is one or more `;`-separated alternatives of the form
/// `transport:key=value,key=value`; connecting tries the alternatives in
/// order.
///
/// # Examples
///
/// ```
/// use busline::Address;
///
/// let address = Address::parse("unix:path=/run/user/1000/bus")?;
/// assert_eq!(address.alternatives().len(), 1);
///
/// let address = Address::parse("tcp:host=localhost,port=4444;unix:path=/tmp/bus")?;
/// assert_eq!(address.alternatives().len(), 2);
/// # Ok::<_, busline::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    endpoints: Vec<Endpoint>,
}

/// A single connectable endpoint of an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Endpoint {
    /// A Unix domain socket bound to a filesystem path.
    UnixPath {
        /// The socket path.
        path: String,
        /// The expected server GUID, when the address carries one.
        guid: Option<String>,
    },
    /// A Linux abstract Unix domain socket.
    UnixAbstract {
        /// The abstract socket name, without the leading NUL.
        name: String,
        /// The expected server GUID, when the address carries one.
        guid: Option<String>,
    },
    /// A TCP endpoint.
    Tcp {
        /// The host name or address to connect to.
        host: String,
        /// The port to connect to.
        port: u16,
        /// The expected server GUID, when the address carries one.
        guid: Option<String>,
    },
}

impl Address {
    /// Parse an address string.
    ///
    /// Alternatives with an unrecognized transport are skipped, matching
    /// how a client scans for the first address it can speak; an address
    /// with no usable alternative is an error.
    pub fn parse(address: &str) -> Result<Self> {
        let mut endpoints = Vec::new();

        for alternative in address.split(';') {
            match Self::parse_alternative(alternative)? {
                Some(endpoint) => endpoints.push(endpoint),
                None => continue,
            }
        }

        if endpoints.is_empty() {
            return Err(Error::new(ErrorKind::InvalidAddress));
        }

        Ok(Self { endpoints })
    }

    fn parse_alternative(alternative: &str) -> Result<Option<Endpoint>> {
        let Some((transport, rest)) = alternative.split_once(':') else {
            return Err(Error::new(ErrorKind::InvalidAddress));
        };

        let mut path = None;
        let mut abstract_name = None;
        let mut host = None;
        let mut port = None;
        let mut family = None;
        let mut guid = None;

        if !rest.is_empty() {
            for pair in rest.split(',') {
                let Some((key, value)) = pair.split_once('=') else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                match key {
                    "path" => path = Some(value.to_owned()),
                    "abstract" => abstract_name = Some(value.to_owned()),
                    "host" => host = Some(value.to_owned()),
                    "port" => port = Some(value.to_owned()),
                    "family" => family = Some(value.to_owned()),
                    "guid" => guid = Some(value.to_owned()),
                    // Unknown keys are allowed and ignored.
                    _ => {}
                }
            }
        }

        match transport {
            "unix" => match (path, abstract_name) {
                (Some(path), None) => Ok(Some(Endpoint::UnixPath { path, guid })),
                (None, Some(name)) => Ok(Some(Endpoint::UnixAbstract { name, guid })),
                _ => Err(Error::new(ErrorKind::InvalidAddress)),
            },
            "tcp" => {
                let Some(host) = host else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                let Some(port) = port else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                let Ok(port) = port.parse::<u16>() else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                if let Some(family) = family {
                    if family != "ipv4" && family != "ipv6" {
                        return Err(Error::new(ErrorKind::InvalidAddress));
                    }
                }

                Ok(Some(Endpoint::Tcp { host, port, guid }))
            }
            _ => Ok(None),
        }
    }

    /// The connectable alternatives, in the order they should be tried.
    pub fn alternatives(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// The address of the session bus, from `DBUS_SESSION_BUS_ADDRESS`.
    pub fn session_bus() -> Result<Self> {
        Self::from_env([ENV_STARTER_ADDRESS, ENV_SESSION_BUS], None)
    }

    /// The address of the system bus, from `DBUS_SYSTEM_BUS_ADDRESS` or
    /// the well-known default location.
    pub fn system_bus() -> Result<Self> {
        Self::from_env(
            [ENV_STARTER_ADDRESS, ENV_SYSTEM_BUS],
            Some(DEFAULT_SYSTEM_BUS),
        )
    }

    fn from_env(
        envs: impl IntoIterator<Item = &'static str>,
        default: Option<&str>,
    ) -> Result<Self> {
        for name in envs {
            let Ok(address) = env::var(name) else {
                continue;
            };

            if !address.is_empty() {
                return Self::parse(&address);
            }
        }

        if let Some(address) = default {
            return Self::parse(address);
        }

        Err(Error::new(ErrorKind::MissingBus))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::UnixPath { path, .. } => write!(f, "unix:path={path}"),
            Endpoint::UnixAbstract { name, .. } => write!(f, "unix:abstract={name}"),
            Endpoint::Tcp { host, port, .. } => write!(f, "tcp:host={host},port={port}"),
        }
    }
}
