//! Framing of complete messages onto the authenticated byte stream.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::os::fd::OwnedFd;

use crate::codec::{BodyReader, BodyWriter};
use crate::error::{Error, ErrorKind, Result};
use crate::message::{Fds, Message, MessageKind};
use crate::object_path::ObjectPathBuf;
use crate::proto::{
    Endianness, Field, Flags, MessageType, FIXED_HEADER_LENGTH, MAX_ARRAY_LENGTH,
    MAX_MESSAGE_LENGTH, PROTOCOL_VERSION,
};
use crate::signature::{Signature, SignatureBuf};
use crate::utils::padding_to;
use crate::value::{Array, Value};

/// The signature of the header field array.
const FIELDS: &Signature = Signature::new_const(b"a(yv)");

/// The element signature of the header field array.
const FIELD_ENTRY: &Signature = Signature::new_const(b"(yv)");

/// A message serialized for the wire, along with the descriptors that must
/// travel out-of-band with its first byte.
#[derive(Debug)]
pub(crate) struct EncodedFrame {
    pub(crate) bytes: Vec<u8>,
    pub(crate) fds: Vec<OwnedFd>,
}

/// Serialize a message. The serial must have been assigned.
///
/// Attached file descriptors are drained out of the message into the
/// returned frame.
pub(crate) fn encode_message(
    message: &Message,
    endianness: Endianness,
    max_message_bytes: u32,
) -> Result<EncodedFrame> {
    let Some(serial) = message.serial else {
        return Err(Error::new(ErrorKind::MissingSerial));
    };

    let signature = message.signature()?;

    // The body always begins at an 8-aligned offset, so marshalling it at
    // the start of its own buffer yields the same bytes.
    let mut body = Vec::new();
    let mut writer = BodyWriter::new(&mut body, endianness);

    for value in &message.body {
        writer.write_value(value)?;
    }

    let Ok(body_length) = u32::try_from(body.len()) else {
        return Err(Error::new(ErrorKind::BodyTooLong(u32::MAX)));
    };

    let fds = message.fds.take_all();

    let mut fields = Array::new(FIELD_ENTRY)?;
    let mut push = |tag: Field, value: Value| -> Result<()> {
        fields.push(Value::Struct(vec![
            Value::Byte(tag.0),
            Value::Variant(Box::new(value)),
        ]))
    };

    match &message.kind {
        MessageKind::MethodCall { path, member } => {
            push(Field::PATH, Value::ObjectPath(path.clone()))?;
            push(Field::MEMBER, Value::String(member.clone()))?;
        }
        MessageKind::MethodReturn { reply_serial } => {
            push(Field::REPLY_SERIAL, Value::UInt32(reply_serial.get()))?;
        }
        MessageKind::Error {
            error_name,
            reply_serial,
        } => {
            push(Field::ERROR_NAME, Value::String(error_name.clone()))?;
            push(Field::REPLY_SERIAL, Value::UInt32(reply_serial.get()))?;
        }
        MessageKind::Signal { path, member } => {
            if message.interface.is_none() {
                return Err(Error::new(ErrorKind::MissingInterface));
            }

            push(Field::PATH, Value::ObjectPath(path.clone()))?;
            push(Field::MEMBER, Value::String(member.clone()))?;
        }
    }

    if let Some(interface) = &message.interface {
        push(Field::INTERFACE, Value::String(interface.clone()))?;
    }

    if let Some(destination) = &message.destination {
        push(Field::DESTINATION, Value::String(destination.clone()))?;
    }

    if let Some(sender) = &message.sender {
        push(Field::SENDER, Value::String(sender.clone()))?;
    }

    if !signature.is_empty() {
        push(Field::SIGNATURE, Value::Signature(signature))?;
    }

    if !fds.is_empty() {
        push(Field::UNIX_FDS, Value::UInt32(fds.len() as u32))?;
    }

    let mut bytes = Vec::with_capacity(FIXED_HEADER_LENGTH + body.len());
    bytes.push(endianness.0);
    bytes.push(message.kind.message_type().0);
    bytes.push(message.flags.0);
    bytes.push(PROTOCOL_VERSION);

    let mut writer = BodyWriter::new(&mut bytes, endianness);
    writer.write_u32(body_length);
    writer.write_u32(serial.get());
    writer.write_value(&Value::Array(fields))?;
    writer.align(8);

    bytes.extend_from_slice(&body);

    let max = max_message_bytes.min(MAX_MESSAGE_LENGTH) as usize;

    if bytes.len() > max {
        return Err(Error::new(ErrorKind::MessageTooLong(bytes.len())));
    }

    Ok(EncodedFrame { bytes, fds })
}

/// An incremental decoder for complete messages.
///
/// Feeding it a buffer either yields a message and the number of bytes it
/// spanned, or indicates that more bytes are needed. Any error is a
/// protocol desync and fatal to the connection.
pub(crate) struct FrameDecoder {
    max_message_bytes: u32,
}

impl FrameDecoder {
    pub(crate) fn new(max_message_bytes: u32) -> Self {
        Self {
            max_message_bytes: max_message_bytes.min(MAX_MESSAGE_LENGTH),
        }
    }

    /// Attempt to decode one message from the front of `buf`, pulling
    /// descriptors referenced by the header from `fds`.
    pub(crate) fn decode(
        &self,
        buf: &[u8],
        fds: &mut VecDeque<OwnedFd>,
    ) -> Result<Option<(Message, usize)>> {
        if buf.len() < FIXED_HEADER_LENGTH {
            return Ok(None);
        }

        let endianness = Endianness::from_flag(buf[0])?;

        let message_type = match buf[1] {
            1..=4 => MessageType(buf[1]),
            value => return Err(Error::new(ErrorKind::UnknownMessageType(value))),
        };

        let flags = Flags(buf[2]);

        if buf[3] != PROTOCOL_VERSION {
            return Err(Error::new(ErrorKind::UnsupportedVersion(buf[3])));
        }

        let mut reader = BodyReader::new(buf, 4, endianness);
        let body_length = reader.read_u32()?;
        let serial = reader.read_u32()?;
        let fields_length = reader.read_u32()?;

        let Some(serial) = NonZeroU32::new(serial) else {
            return Err(Error::new(ErrorKind::ZeroSerial));
        };

        if fields_length > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(fields_length)));
        }

        let header_end = FIXED_HEADER_LENGTH + fields_length as usize;
        let body_start = header_end + padding_to(8, header_end);
        let total = body_start + body_length as usize;

        if total > self.max_message_bytes as usize {
            return Err(Error::new(ErrorKind::MessageTooLong(total)));
        }

        if buf.len() < total {
            return Ok(None);
        }

        // Decode the field array against a buffer clipped at the header so
        // a corrupt length cannot read into the body.
        let mut reader = BodyReader::new(&buf[..header_end], 12, endianness);
        let fields = reader.read_value(FIELDS)?;

        let mut header = DecodedHeader::default();
        header.interpret(fields)?;

        let signature = match &header.signature {
            Some(signature) => signature.clone(),
            None => SignatureBuf::empty(),
        };

        let mut body = Vec::new();
        let mut reader = BodyReader::new(&buf[..total], body_start, endianness);

        for element in signature.iter() {
            body.push(reader.read_value(element)?);
        }

        if !reader.is_empty() {
            return Err(Error::new(ErrorKind::TrailingBodyBytes));
        }

        let kind = header.take_kind(message_type)?;

        let fds = match header.unix_fds {
            Some(count) if count > 0 => {
                if fds.len() < count as usize {
                    return Err(Error::new(ErrorKind::MissingFds(count)));
                }

                Fds::from_vec(fds.drain(..count as usize).collect())
            }
            _ => Fds::new(),
        };

        let message = Message {
            kind,
            serial: Some(serial),
            flags,
            interface: header.interface,
            destination: header.destination,
            sender: header.sender,
            body,
            fds,
        };

        Ok(Some((message, total)))
    }
}

/// Header fields pulled out of the `a(yv)` array.
#[derive(Default)]
struct DecodedHeader {
    path: Option<ObjectPathBuf>,
    interface: Option<String>,
    member: Option<String>,
    error_name: Option<String>,
    reply_serial: Option<NonZeroU32>,
    destination: Option<String>,
    sender: Option<String>,
    signature: Option<SignatureBuf>,
    unix_fds: Option<u32>,
}

impl DecodedHeader {
    fn interpret(&mut self, fields: Value) -> Result<()> {
        let Value::Array(fields) = fields else {
            return Err(Error::new(ErrorKind::Truncated));
        };

        for entry in fields.values() {
            let Value::Struct(entry) = entry else {
                return Err(Error::new(ErrorKind::Truncated));
            };

            let [Value::Byte(tag), Value::Variant(value)] = &entry[..] else {
                return Err(Error::new(ErrorKind::Truncated));
            };

            let field = Field(*tag);
            let mismatch = || Error::new(ErrorKind::InvalidHeaderField(field));

            match field {
                Field::PATH => match &**value {
                    Value::ObjectPath(path) => self.path = Some(path.clone()),
                    _ => return Err(mismatch()),
                },
                Field::INTERFACE => match &**value {
                    Value::String(value) => self.interface = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::MEMBER => match &**value {
                    Value::String(value) => self.member = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::ERROR_NAME => match &**value {
                    Value::String(value) => self.error_name = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::REPLY_SERIAL => match &**value {
                    Value::UInt32(value) => {
                        let Some(value) = NonZeroU32::new(*value) else {
                            return Err(Error::new(ErrorKind::ZeroReplySerial));
                        };

                        self.reply_serial = Some(value);
                    }
                    _ => return Err(mismatch()),
                },
                Field::DESTINATION => match &**value {
                    Value::String(value) => self.destination = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::SENDER => match &**value {
                    Value::String(value) => self.sender = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::SIGNATURE => match &**value {
                    Value::Signature(value) => self.signature = Some(value.clone()),
                    _ => return Err(mismatch()),
                },
                Field::UNIX_FDS => match &**value {
                    Value::UInt32(value) => self.unix_fds = Some(*value),
                    _ => return Err(mismatch()),
                },
                // Unknown header fields must be ignored.
                _ => {}
            }
        }

        Ok(())
    }

    /// Build the message kind from the required fields, leaving the common
    /// fields in place for the caller.
    fn take_kind(&mut self, message_type: MessageType) -> Result<MessageKind> {
        Ok(match message_type {
            MessageType::METHOD_CALL => MessageKind::MethodCall {
                path: self.path.take().ok_or(Error::new(ErrorKind::MissingPath))?,
                member: self
                    .member
                    .take()
                    .ok_or(Error::new(ErrorKind::MissingMember))?,
            },
            MessageType::METHOD_RETURN => MessageKind::MethodReturn {
                reply_serial: self
                    .reply_serial
                    .ok_or(Error::new(ErrorKind::MissingReplySerial))?,
            },
            MessageType::ERROR => MessageKind::Error {
                error_name: self
                    .error_name
                    .take()
                    .ok_or(Error::new(ErrorKind::MissingErrorName))?,
                reply_serial: self
                    .reply_serial
                    .ok_or(Error::new(ErrorKind::MissingReplySerial))?,
            },
            MessageType::SIGNAL => {
                if self.interface.is_none() {
                    return Err(Error::new(ErrorKind::MissingInterface));
                }

                MessageKind::Signal {
                    path: self.path.take().ok_or(Error::new(ErrorKind::MissingPath))?,
                    member: self
                        .member
                        .take()
                        .ok_or(Error::new(ErrorKind::MissingMember))?,
                }
            }
            _ => return Err(Error::new(ErrorKind::UnknownMessageType(message_type.0))),
        })
    }
}
