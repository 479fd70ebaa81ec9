use std::fmt;
use std::num::NonZeroU32;

use crate::object_path::ObjectPathBuf;
use crate::proto::Flags;
use crate::signature::{SignatureBuf, SignatureError};
use crate::value::Value;

use super::{Fds, MessageKind};

/// A D-Bus message: one of the four kinds, its header fields and its body.
///
/// Messages are built with the constructors and `with_*` methods and sent
/// through a [`Connection`]. A message without a serial gets one assigned
/// by the connection when it is sent; builders that need the serial up
/// front can allocate one with [`Connection::next_serial`].
///
/// [`Connection`]: crate::Connection
/// [`Connection::next_serial`]: crate::Connection::next_serial
///
/// # Examples
///
/// ```
/// use busline::{Message, MessageKind, ObjectPath, Value};
///
/// const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");
///
/// let m = Message::method_call(PATH.into(), "RequestName")
///     .with_destination("org.freedesktop.DBus")
///     .with_body(vec![
///         Value::String("com.example.App".into()),
///         Value::UInt32(0),
///     ]);
///
/// assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
/// assert_eq!(m.signature()?.as_str(), "su");
/// # Ok::<_, busline::SignatureError>(())
/// ```
#[derive(Clone)]
pub struct Message {
    pub(crate) kind: MessageKind,
    pub(crate) serial: Option<NonZeroU32>,
    pub(crate) flags: Flags,
    pub(crate) interface: Option<String>,
    pub(crate) destination: Option<String>,
    pub(crate) sender: Option<String>,
    pub(crate) body: Vec<Value>,
    pub(crate) fds: Fds,
}

impl Message {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            serial: None,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            body: Vec::new(),
            fds: Fds::new(),
        }
    }

    /// Construct a method call message.
    pub fn method_call(path: ObjectPathBuf, member: impl Into<String>) -> Self {
        Self::new(MessageKind::MethodCall {
            path,
            member: member.into(),
        })
    }

    /// Construct a signal message.
    ///
    /// Signals require an interface, so it is part of the constructor.
    pub fn signal(
        path: ObjectPathBuf,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Signal {
            path,
            member: member.into(),
        })
        .with_interface(interface)
    }

    /// Construct a method return replying to this message, with the sender
    /// and destination swapped.
    ///
    /// Returns `None` when this message has no serial to reply to, which
    /// cannot happen for a message received from the wire.
    #[must_use]
    pub fn method_return(&self) -> Option<Self> {
        Some(Self {
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            ..Self::new(MessageKind::MethodReturn {
                reply_serial: self.serial?,
            })
        })
    }

    /// Construct an error replying to this message, with the sender and
    /// destination swapped and the given message as the only body value.
    ///
    /// Returns `None` when this message has no serial to reply to.
    #[must_use]
    pub fn error(&self, error_name: impl Into<String>, message: impl Into<String>) -> Option<Self> {
        Some(Self {
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            body: vec![Value::String(message.into())],
            ..Self::new(MessageKind::Error {
                error_name: error_name.into(),
                reply_serial: self.serial?,
            })
        })
    }

    /// Get the kind of the message.
    #[inline]
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Get the serial of the message, if one has been assigned.
    #[inline]
    pub fn serial(&self) -> Option<NonZeroU32> {
        self.serial
    }

    /// Set the serial of the message explicitly.
    #[must_use]
    pub fn with_serial(mut self, serial: NonZeroU32) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Get the flags of the message.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::{Flags, Message, ObjectPath};
    ///
    /// const PATH: &ObjectPath = ObjectPath::new_const(b"/com/example");
    ///
    /// let m = Message::method_call(PATH.into(), "Notify")
    ///     .with_flags(Flags::NO_REPLY_EXPECTED);
    ///
    /// assert!(!m.reply_expected());
    /// ```
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Test if this message is a method call which expects a reply.
    pub fn reply_expected(&self) -> bool {
        matches!(self.kind, MessageKind::MethodCall { .. })
            && !self.flags.contains(Flags::NO_REPLY_EXPECTED)
    }

    /// Get the interface of the message.
    #[inline]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Modify the interface of the message.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Get the destination of the message.
    #[inline]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Get the sender of the message.
    ///
    /// On messages received through a bus this is set by the bus itself.
    #[inline]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Get the body of the message.
    #[inline]
    pub fn body(&self) -> &[Value] {
        &self.body
    }

    /// Replace the body of the message.
    #[must_use]
    pub fn with_body(mut self, body: Vec<Value>) -> Self {
        self.body = body;
        self
    }

    /// The signature of the message body.
    pub fn signature(&self) -> Result<SignatureBuf, SignatureError> {
        let mut bytes = Vec::new();

        for value in &self.body {
            value.write_signature(&mut bytes);
        }

        SignatureBuf::new(&bytes)
    }

    /// The file descriptor table of the message.
    #[inline]
    pub fn fds(&self) -> &Fds {
        &self.fds
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        // NB: attached file descriptors are identity-less and excluded.
        self.kind == other.kind
            && self.serial == other.serial
            && self.flags == other.flags
            && self.interface == other.interface
            && self.destination == other.destination
            && self.sender == other.sender
            && self.body == other.body
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Message");

        d.field("kind", &self.kind)
            .field("serial", &self.serial)
            .field("flags", &self.flags);

        if let Some(interface) = &self.interface {
            d.field("interface", interface);
        }

        if let Some(destination) = &self.destination {
            d.field("destination", destination);
        }

        if let Some(sender) = &self.sender {
            d.field("sender", sender);
        }

        // Bodies can be arbitrarily large; elide the tail when logging.
        if self.body.len() > 4 {
            d.field("body", &format_args!("[..{} values..]", self.body.len()));
        } else {
            d.field("body", &self.body);
        }

        if !self.fds.is_empty() {
            d.field("fds", &self.fds);
        }

        d.finish()
    }
}
