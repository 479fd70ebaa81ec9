use std::io;

use core::fmt;
use core::str::Utf8Error;

use crate::{ObjectPathError, SignatureError};

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The coarse classification of an [`Error`].
///
/// The classification determines how an error propagates: protocol and
/// authentication failures tear the connection down, remote errors and
/// timeouts surface on the individual request future only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// A codec, framing or state machine violation. Fatal to the
    /// connection.
    Protocol,
    /// The SASL handshake terminated without an `OK`.
    AuthFailed,
    /// An operation was attempted in a connection state that forbids it.
    NotConnected,
    /// The reply deadline for a method call elapsed.
    MethodTimedOut,
    /// The peer answered with a D-Bus error reply.
    Remote,
    /// An operating system level I/O failure.
    Transport,
    /// A message or field exceeded a configured cap.
    LimitExceeded,
    /// Pending work failed because the connection closed.
    Disconnected,
    /// The pending reply registry is at capacity.
    TooManyInFlight,
}

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Construct an error from a remote D-Bus error reply.
    pub(crate) fn remote(name: String, message: Option<String>) -> Error {
        Self::new(ErrorKind::Remote { name, message })
    }

    #[inline]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The coarse classification of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::{Error, ErrorCategory, Signature};
    ///
    /// let e = Signature::new(b"a").unwrap_err();
    /// assert_eq!(Error::from(e).category(), ErrorCategory::Protocol);
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match &self.kind {
            ErrorKind::Io(..) | ErrorKind::WouldBlock | ErrorKind::ConnectTimedOut => {
                ErrorCategory::Transport
            }
            ErrorKind::MissingBus | ErrorKind::InvalidAddress => ErrorCategory::Transport,
            ErrorKind::BodyTooLong(..)
            | ErrorKind::ArrayTooLong(..)
            | ErrorKind::MessageTooLong(..)
            | ErrorKind::SignatureTooLong => ErrorCategory::LimitExceeded,
            ErrorKind::AuthRejected
            | ErrorKind::AuthProtocolViolation
            | ErrorKind::SaslLineTooLong(..)
            | ErrorKind::CookieUnavailable => ErrorCategory::AuthFailed,
            ErrorKind::NotConnected => ErrorCategory::NotConnected,
            ErrorKind::MethodTimedOut => ErrorCategory::MethodTimedOut,
            ErrorKind::Disconnected => ErrorCategory::Disconnected,
            ErrorKind::TooManyInFlight => ErrorCategory::TooManyInFlight,
            ErrorKind::Remote { .. } => ErrorCategory::Remote,
            _ => ErrorCategory::Protocol,
        }
    }

    /// The D-Bus error name, if this is a [`Remote`] error.
    ///
    /// [`Remote`]: ErrorCategory::Remote
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Remote { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The human readable message of a [`Remote`] error, when the peer
    /// supplied one.
    ///
    /// [`Remote`]: ErrorCategory::Remote
    pub fn remote_message(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Remote { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::ObjectPath(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock => Self::new(ErrorKind::WouldBlock),
            _ => Self::new(ErrorKind::Io(error)),
        }
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(..) => write!(f, "I/O error"),
            ErrorKind::Signature(..) => write!(f, "Signature error"),
            ErrorKind::ObjectPath(..) => write!(f, "Object path error"),
            ErrorKind::Utf8Error(..) => write!(f, "UTF-8 error"),
            ErrorKind::WouldBlock => write!(f, "Would block"),
            ErrorKind::MissingBus => write!(f, "Missing bus to connect to"),
            ErrorKind::InvalidAddress => write!(f, "Invalid D-Bus address"),
            ErrorKind::ConnectTimedOut => write!(f, "Connecting to the bus timed out"),
            ErrorKind::UnexpectedEndian(byte) => {
                write!(f, "Unsupported endian flag {byte:#04x}")
            }
            ErrorKind::UnsupportedVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::UnknownMessageType(value) => {
                write!(f, "Unknown message type {value}")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ZeroReplySerial => write!(f, "Zero REPLY_SERIAL header"),
            ErrorKind::MissingSerial => {
                write!(f, "Message has no serial assigned")
            }
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingInterface => {
                write!(f, "Missing required INTERFACE header")
            }
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingReplySerial => {
                write!(f, "Missing required REPLY_SERIAL header")
            }
            ErrorKind::MissingErrorName => {
                write!(f, "Missing required ERROR_NAME header")
            }
            ErrorKind::Truncated => write!(f, "Buffer ended in the middle of a value"),
            ErrorKind::TrailingBodyBytes => {
                write!(f, "Body contains bytes beyond its signature")
            }
            ErrorKind::ValueSignatureMismatch => {
                write!(f, "Value does not match the declared element signature")
            }
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::EmbeddedNull => write!(f, "String contains an embedded null byte"),
            ErrorKind::InvalidBoolean(value) => {
                write!(f, "Boolean must be 0 or 1, got {value}")
            }
            ErrorKind::InvalidHeaderField(field) => {
                write!(f, "Malformed header field {field:?}")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::MessageTooLong(length) => {
                write!(
                    f,
                    "Message of length {length} is too long (max is 134217728)"
                )
            }
            ErrorKind::SignatureTooLong => write!(f, "Signature is too long (max is 255)"),
            ErrorKind::MissingFds(count) => {
                write!(f, "Message references {count} file descriptors not received")
            }
            ErrorKind::FdPassingUnsupported => {
                write!(f, "Transport does not support file descriptor passing")
            }
            ErrorKind::AuthRejected => {
                write!(f, "Authentication failed for all supported mechanisms")
            }
            ErrorKind::AuthProtocolViolation => {
                write!(f, "Peer violated the SASL protocol")
            }
            ErrorKind::SaslLineTooLong(length) => {
                write!(f, "SASL line of {length} bytes exceeds the limit")
            }
            ErrorKind::CookieUnavailable => {
                write!(f, "No usable DBUS_COOKIE_SHA1 keyring cookie")
            }
            ErrorKind::NotConnected => write!(f, "Connection is not established"),
            ErrorKind::Disconnected => write!(f, "Connection closed"),
            ErrorKind::MethodTimedOut => write!(f, "Method call timed out"),
            ErrorKind::TooManyInFlight => {
                write!(f, "Too many method calls in flight")
            }
            ErrorKind::NoReplyExpected => {
                write!(f, "Message does not expect a reply")
            }
            ErrorKind::Remote { name, message } => match message {
                Some(message) => write!(f, "{name}: {message}"),
                None => write!(f, "{name}"),
            },
            ErrorKind::DuplicateStage(name) => {
                write!(f, "Pipeline stage {name:?} already exists")
            }
            ErrorKind::UnknownStage(name) => {
                write!(f, "Pipeline stage {name:?} does not exist")
            }
            ErrorKind::ReservedStage(name) => {
                write!(f, "Pipeline stage name {name:?} is reserved")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::ObjectPath(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    ObjectPath(ObjectPathError),
    Utf8Error(Utf8Error),
    WouldBlock,
    MissingBus,
    InvalidAddress,
    ConnectTimedOut,
    UnexpectedEndian(u8),
    UnsupportedVersion(u8),
    UnknownMessageType(u8),
    ZeroSerial,
    ZeroReplySerial,
    MissingSerial,
    MissingPath,
    MissingInterface,
    MissingMember,
    MissingReplySerial,
    MissingErrorName,
    Truncated,
    TrailingBodyBytes,
    ValueSignatureMismatch,
    NotNullTerminated,
    EmbeddedNull,
    InvalidBoolean(u32),
    InvalidHeaderField(crate::proto::Field),
    ArrayTooLong(u32),
    BodyTooLong(u32),
    MessageTooLong(usize),
    SignatureTooLong,
    MissingFds(u32),
    FdPassingUnsupported,
    AuthRejected,
    AuthProtocolViolation,
    SaslLineTooLong(usize),
    CookieUnavailable,
    NotConnected,
    Disconnected,
    MethodTimedOut,
    TooManyInFlight,
    NoReplyExpected,
    Remote {
        name: String,
        message: Option<String>,
    },
    DuplicateStage(String),
    UnknownStage(String),
    ReservedStage(String),
}
