//! The SASL handshake D-Bus performs on a freshly opened transport.
//!
//! The engine here is sans-I/O: it is fed one server line at a time and
//! answers with bytes to put on the wire, so the same state machine serves
//! any transport and is testable without sockets.


pub(crate) use self::cookie::CookieSha1;
mod cookie;

pub(crate) use self::mechanism::{Anonymous, External, Mechanism};
mod mechanism;

use crate::error::{Error, ErrorKind, Result};
use crate::lossy_str::LossyStr;
use crate::utils::{split_once, trim_end};

/// The maximum length of a single line on the handshake channel.
pub(crate) const MAX_LINE_LENGTH: usize = 16384;

/// A SASL mechanism selectable on a [`ConnectionBuilder`].
///
/// [`ConnectionBuilder`]: crate::ConnectionBuilder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMechanism {
    /// Prove identity through the operating system credentials of the
    /// socket, sending the process uid.
    External,
    /// Prove identity by answering a SHA-1 challenge over a cookie shared
    /// through the home directory.
    CookieSha1,
    /// No identity; an opaque trace string is sent instead.
    Anonymous,
}

/// What the driver must do next to advance the handshake.
#[derive(Debug)]
pub(crate) enum Step {
    /// Write these bytes, then read the next server line.
    Send(Vec<u8>),
    /// Write these bytes; the stream then switches to framed messages.
    Finish(Vec<u8>),
}

/// The completed handshake.
#[derive(Debug, Clone)]
pub(crate) struct Negotiated {
    /// The GUID of the server from its `OK` line.
    pub(crate) guid: String,
    /// Whether the server agreed to pass Unix file descriptors.
    pub(crate) fd_passing: bool,
}

/// A server line, decoded.
#[derive(Debug, PartialEq, Eq)]
enum Response {
    Ok(String),
    /// Rejection, with the mechanisms the server advertised.
    Rejected(Vec<String>),
    Data(Vec<u8>),
    Error,
    AgreeUnixFd,
}

impl Response {
    fn parse(line: &[u8]) -> Result<Self> {
        let line = trim_end(line);
        let (command, rest) = match split_once(line, b' ') {
            Some((command, rest)) => (command, rest),
            None => (line, &[][..]),
        };

        Ok(match command {
            b"OK" => {
                let Ok(guid) = std::str::from_utf8(rest) else {
                    return Err(Error::new(ErrorKind::AuthProtocolViolation));
                };

                Response::Ok(guid.to_owned())
            }
            b"REJECTED" => Response::Rejected(
                rest.split(|&b| b == b' ')
                    .filter(|name| !name.is_empty())
                    .map(|name| String::from_utf8_lossy(name).into_owned())
                    .collect(),
            ),
            b"DATA" => {
                let Ok(data) = hex::decode(rest) else {
                    return Err(Error::new(ErrorKind::AuthProtocolViolation));
                };

                Response::Data(data)
            }
            b"ERROR" => Response::Error,
            b"AGREE_UNIX_FD" => Response::AgreeUnixFd,
            _ => {
                tracing::debug!(line = %LossyStr::new(line), "unknown SASL response");
                return Err(Error::new(ErrorKind::AuthProtocolViolation));
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitAuth,
    WaitFd,
    Done,
}

/// The client side of the SASL handshake.
pub(crate) struct Handshake {
    mechanisms: Vec<Box<dyn Mechanism>>,
    current: usize,
    state: State,
    negotiate_fd: bool,
    guid: Option<String>,
    fd_passing: bool,
}

impl Handshake {
    /// Construct a handshake trying `mechanisms` in order.
    ///
    /// When `negotiate_fd` is set, `NEGOTIATE_UNIX_FD` is attempted after
    /// authentication succeeds; the server declining only disables
    /// descriptor passing.
    pub(crate) fn new(mechanisms: Vec<Box<dyn Mechanism>>, negotiate_fd: bool) -> Self {
        Self {
            mechanisms,
            current: 0,
            state: State::WaitAuth,
            negotiate_fd,
            guid: None,
            fd_passing: false,
        }
    }

    /// The first bytes to send: the credentials NUL byte followed by the
    /// `AUTH` line of the first mechanism.
    pub(crate) fn start(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![0u8];
        self.auth_line(&mut out)?;
        Ok(out)
    }

    /// Feed one server line, producing the next step.
    pub(crate) fn feed(&mut self, line: &[u8]) -> Result<Step> {
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::new(ErrorKind::SaslLineTooLong(line.len())));
        }

        match self.state {
            State::WaitAuth => self.feed_auth(Response::parse(line)?),
            State::WaitFd => self.feed_fd(Response::parse(line)?),
            State::Done => Err(Error::new(ErrorKind::AuthProtocolViolation)),
        }
    }

    /// The negotiated parameters, available once the handshake finished.
    pub(crate) fn negotiated(&self) -> Option<Negotiated> {
        if self.state != State::Done {
            return None;
        }

        Some(Negotiated {
            guid: self.guid.clone().unwrap_or_default(),
            fd_passing: self.fd_passing,
        })
    }

    fn feed_auth(&mut self, response: Response) -> Result<Step> {
        match response {
            Response::Ok(guid) => {
                self.guid = Some(guid);

                if self.negotiate_fd {
                    self.state = State::WaitFd;
                    Ok(Step::Send(b"NEGOTIATE_UNIX_FD\r\n".to_vec()))
                } else {
                    Ok(self.begin())
                }
            }
            Response::Data(data) => {
                let Some(mechanism) = self.mechanisms.get_mut(self.current) else {
                    return Err(Error::new(ErrorKind::AuthProtocolViolation));
                };

                match mechanism.challenge(&data) {
                    Ok(response) => {
                        let mut out = b"DATA ".to_vec();
                        out.extend_from_slice(hex::encode(response).as_bytes());
                        out.extend_from_slice(b"\r\n");
                        Ok(Step::Send(out))
                    }
                    Err(error) => {
                        tracing::debug!(
                            mechanism = mechanism.name(),
                            %error,
                            "mechanism failed to answer challenge"
                        );
                        Ok(Step::Send(b"CANCEL\r\n".to_vec()))
                    }
                }
            }
            Response::Rejected(supported) => self.next_mechanism(Some(&supported)),
            Response::Error => self.next_mechanism(None),
            Response::AgreeUnixFd => Err(Error::new(ErrorKind::AuthProtocolViolation)),
        }
    }

    fn feed_fd(&mut self, response: Response) -> Result<Step> {
        match response {
            Response::AgreeUnixFd => {
                self.fd_passing = true;
                Ok(self.begin())
            }
            Response::Error => {
                self.fd_passing = false;
                Ok(self.begin())
            }
            _ => Err(Error::new(ErrorKind::AuthProtocolViolation)),
        }
    }

    /// Move on after a rejection.
    ///
    /// A `REJECTED` line names the mechanisms the server supports; skip
    /// ours that it does not. An empty or absent list gives nothing to
    /// filter on, so the next mechanism is simply tried.
    fn next_mechanism(&mut self, supported: Option<&[String]>) -> Result<Step> {
        let mut next = self.current + 1;

        if let Some(supported) = supported {
            if !supported.is_empty() {
                while next < self.mechanisms.len()
                    && !supported
                        .iter()
                        .any(|name| name == self.mechanisms[next].name())
                {
                    next += 1;
                }
            }
        }

        if next >= self.mechanisms.len() {
            return Err(Error::new(ErrorKind::AuthRejected));
        }

        self.current = next;

        let mut out = Vec::new();
        self.auth_line(&mut out)?;
        Ok(Step::Send(out))
    }

    fn begin(&mut self) -> Step {
        self.state = State::Done;
        Step::Finish(b"BEGIN\r\n".to_vec())
    }

    fn auth_line(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let Some(mechanism) = self.mechanisms.get_mut(self.current) else {
            return Err(Error::new(ErrorKind::AuthRejected));
        };

        out.extend_from_slice(b"AUTH ");
        out.extend_from_slice(mechanism.name().as_bytes());

        if let Some(initial) = mechanism.initial_response()? {
            out.push(b' ');
            out.extend_from_slice(hex::encode(initial).as_bytes());
        }

        out.extend_from_slice(b"\r\n");
        Ok(())
    }
}
