//! Names and helpers for the `org.freedesktop.DBus` bus interfaces.

use crate::object_path::ObjectPath;
use crate::{Message, Value};

/// Well known destination name of the bus itself.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name of the bus itself.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known D-Bus path of the bus itself.
pub const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");

/// The peer interface every connection implements.
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

/// Error name for a generic failure.
pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";

/// Error name for calling a method that does not exist.
pub const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// Error name for a call that did not receive a reply.
pub const ERROR_NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";

/// Error name for operating on a closed connection.
pub const ERROR_DISCONNECTED: &str = "org.freedesktop.DBus.Error.Disconnected";

raw_set! {
    /// The flags to a `RequestName` call.
    #[repr(u32)]
    pub enum NameFlag {
        /// Allow another application which asks for this name to take it
        /// over, releasing it from the current owner.
        ALLOW_REPLACEMENT = 1,
        /// Try to replace the current owner if there is one. Only succeeds
        /// when the current owner specified
        /// [`NameFlag::ALLOW_REPLACEMENT`].
        REPLACE_EXISTING = 2,
        /// Fail the request outright instead of queueing for the name when
        /// it is currently owned.
        DO_NOT_QUEUE = 4,
    }
}

raw_enum! {
    /// The reply to a `RequestName` call.
    #[repr(u32)]
    pub enum NameReply {
        /// The caller is now the primary owner of the name.
        PRIMARY_OWNER = 1,
        /// The name already has an owner and the caller was queued for it.
        IN_QUEUE = 2,
        /// The name already has an owner and the request could neither
        /// replace nor queue.
        EXISTS = 3,
        /// The caller already owns the name.
        ALREADY_OWNER = 4,
    }
}

/// The mandatory first message on a bus connection.
///
/// The reply carries the unique name (`:x.y`) assigned to this connection.
pub fn hello() -> Message {
    Message::method_call(PATH.into(), "Hello")
        .with_interface(INTERFACE)
        .with_destination(DESTINATION)
}

/// A `Peer.Ping` call, used for health checking.
pub fn ping() -> Message {
    Message::method_call(PATH.into(), "Ping")
        .with_interface(PEER_INTERFACE)
        .with_destination(DESTINATION)
}

/// A `Peer.GetMachineId` call.
pub fn get_machine_id() -> Message {
    Message::method_call(PATH.into(), "GetMachineId")
        .with_interface(PEER_INTERFACE)
        .with_destination(DESTINATION)
}

/// A `RequestName` call, asking the bus to make this connection
/// addressable under `name`.
pub fn request_name(name: &str, flags: NameFlag) -> Message {
    Message::method_call(PATH.into(), "RequestName")
        .with_interface(INTERFACE)
        .with_destination(DESTINATION)
        .with_body(vec![
            Value::String(name.to_owned()),
            Value::UInt32(flags.0),
        ])
}
