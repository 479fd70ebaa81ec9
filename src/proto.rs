//! Low level details of the D-Bus wire protocol.

use crate::error::{Error, ErrorKind, Result};

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// The maximum length of a complete message in bytes.
pub const MAX_MESSAGE_LENGTH: u32 = 1u32 << 27;

/// The maximum length of a single array in bytes.
pub const MAX_ARRAY_LENGTH: u32 = 1u32 << 26;

/// The number of bytes in the fixed header prefix, up to and including the
/// length of the header field array.
pub(crate) const FIXED_HEADER_LENGTH: usize = 16;

raw_enum! {
    /// The endianness of a message.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian.
        LITTLE = b'l',
        /// Big endian.
        BIG = b'B',
    }
}

impl Endianness {
    /// Native endian.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::LITTLE;
    /// Native endian.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::BIG;

    /// Interpret an endianness flag from the first byte of a message.
    pub(crate) fn from_flag(byte: u8) -> Result<Self> {
        match byte {
            b'l' => Ok(Self::LITTLE),
            b'B' => Ok(Self::BIG),
            byte => Err(Error::new(ErrorKind::UnexpectedEndian(byte))),
        }
    }
}

raw_enum! {
    /// The type of a message.
    #[repr(u8)]
    pub enum MessageType {
        /// Method call. This message type may prompt a reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply. If the first argument exists and is a string, it is
        /// an error message.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

raw_set! {
    /// Flags inside of a D-Bus message.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::Flags;
    ///
    /// let flags = Flags::EMPTY;
    /// assert!(!flags.contains(Flags::NO_REPLY_EXPECTED));
    ///
    /// let flags = Flags::NO_REPLY_EXPECTED | Flags::NO_AUTO_START;
    /// assert!(flags.contains(Flags::NO_REPLY_EXPECTED));
    /// assert!(!flags.contains(Flags::ALLOW_INTERACTIVE_AUTHORIZATION));
    /// ```
    #[repr(u8)]
    pub enum Flags {
        /// An empty set of flags.
        EMPTY = 0,
        /// This message does not expect method return replies or error
        /// replies, even if it is of a type that can have a reply; the reply
        /// should be omitted.
        NO_REPLY_EXPECTED = 1,
        /// The bus must not launch an owner for the destination name in
        /// response to this message.
        NO_AUTO_START = 2,
        /// This flag may be set on a method call message to inform the
        /// receiving side that the caller is prepared to wait for
        /// interactive authorization, which might take a considerable time
        /// to complete.
        ALLOW_INTERACTIVE_AUTHORIZATION = 4,
    }
}

raw_enum! {
    /// A header field tag.
    #[repr(u8)]
    pub enum Field {
        /// The object to send a call to, or the object a signal is emitted
        /// from. This header field is controlled by the message sender.
        PATH = 1,
        /// The interface to invoke a method call on, or that a signal is
        /// emitted from. Optional for method calls, required for signals.
        INTERFACE = 2,
        /// The member, either the method name or signal name.
        MEMBER = 3,
        /// The name of the error that occurred, for errors.
        ERROR_NAME = 4,
        /// The serial number of the message this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// Unique name of the sending connection. On a message bus this
        /// header field is controlled by the message bus itself.
        SENDER = 7,
        /// The signature of the message body. If omitted, it is assumed to
        /// be the empty signature and the body must be 0-length.
        SIGNATURE = 8,
        /// The number of Unix file descriptors that accompany the message.
        /// The descriptors themselves travel out-of-band and must arrive no
        /// later than the last byte of the message.
        UNIX_FDS = 9,
    }
}

raw_enum! {
    /// A type code inside of a signature.
    #[repr(u8)]
    pub enum Type {
        /// Not a valid type code, used to terminate signatures.
        INVALID = b'\0',
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean value, 0 or 1, marshalled as a 32-bit integer.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double-precision floating point.
        DOUBLE = b'd',
        /// UTF-8 string, NUL-terminated on the wire.
        STRING = b's',
        /// Name of an object instance.
        OBJECT_PATH = b'o',
        /// A type signature.
        SIGNATURE = b'g',
        /// Index into an out-of-band array of file descriptors.
        UNIX_FD = b'h',
        /// Array start.
        ARRAY = b'a',
        /// Variant type, the type of the value is part of the value itself.
        VARIANT = b'v',
        /// Struct start.
        OPEN_PAREN = b'(',
        /// Struct end.
        CLOSE_PAREN = b')',
        /// Dict entry start.
        OPEN_BRACE = b'{',
        /// Dict entry end.
        CLOSE_BRACE = b'}',
    }
}

impl Type {
    #[inline]
    pub(crate) const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// The natural alignment of values of this type code, in bytes.
    ///
    /// Container openers report the alignment of the container: arrays align
    /// their length field to 4, structs and dict entries align to 8.
    pub(crate) const fn alignment(self) -> usize {
        match self {
            Type::BYTE | Type::SIGNATURE | Type::VARIANT => 1,
            Type::INT16 | Type::UINT16 => 2,
            Type::BOOLEAN
            | Type::INT32
            | Type::UINT32
            | Type::UNIX_FD
            | Type::STRING
            | Type::OBJECT_PATH
            | Type::ARRAY => 4,
            _ => 8,
        }
    }
}

/// The fixed portion of a message header, before the header field array.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) version: u8,
    pub(crate) body_length: u32,
    pub(crate) serial: u32,
}
