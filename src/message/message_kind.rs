use std::num::NonZeroU32;

use crate::object_path::ObjectPathBuf;
use crate::proto::MessageType;

/// The kind of a D-Bus [`Message`].
///
/// [`Message`]: crate::Message
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// Method call. This message type may prompt a reply.
    MethodCall {
        /// The path of the object being called.
        path: ObjectPathBuf,
        /// The member being called.
        member: String,
    },
    /// Method reply with returned data.
    MethodReturn {
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Error reply. If the first body value is a string, it is an error
    /// message.
    Error {
        /// The name of the error.
        error_name: String,
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Signal emission.
    Signal {
        /// The path of the object emitting the signal.
        path: ObjectPathBuf,
        /// The member being signalled.
        member: String,
    },
}

impl MessageKind {
    pub(crate) fn message_type(&self) -> MessageType {
        match self {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}
