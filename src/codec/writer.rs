use crate::error::{Error, ErrorKind, Result};
use crate::proto::{Endianness, MAX_ARRAY_LENGTH};
use crate::signature::Signature;
use crate::utils::padding_to;
use crate::value::Value;

/// A writer marshalling values onto a message buffer.
///
/// Offsets are absolute within the message, so the buffer handed in must
/// start at the first byte of the message header.
pub(crate) struct BodyWriter<'a> {
    buf: &'a mut Vec<u8>,
    endianness: Endianness,
}

impl<'a> BodyWriter<'a> {
    pub(crate) fn new(buf: &'a mut Vec<u8>, endianness: Endianness) -> Self {
        Self { buf, endianness }
    }

    /// The current absolute offset.
    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Pad with zero bytes to the given alignment.
    pub(crate) fn align(&mut self, alignment: usize) {
        let padding = padding_to(alignment, self.buf.len());
        self.buf.extend(std::iter::repeat(0).take(padding));
    }

    #[inline]
    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.align(2);
        let bytes = match self.endianness {
            Endianness::BIG => value.to_be_bytes(),
            _ => value.to_le_bytes(),
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.align(4);
        let bytes = match self.endianness {
            Endianness::BIG => value.to_be_bytes(),
            _ => value.to_le_bytes(),
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.align(8);
        let bytes = match self.endianness {
            Endianness::BIG => value.to_be_bytes(),
            _ => value.to_le_bytes(),
        };
        self.buf.extend_from_slice(&bytes);
    }

    /// Write a string payload: 32-bit length, bytes, NUL.
    pub(crate) fn write_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::new(ErrorKind::EmbeddedNull));
        }

        let Ok(len) = u32::try_from(value.len()) else {
            return Err(Error::new(ErrorKind::BodyTooLong(u32::MAX)));
        };

        self.write_u32(len);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    /// Write a signature payload: 8-bit length, bytes, NUL.
    pub(crate) fn write_signature(&mut self, value: &Signature) {
        // Signature length is capped at 255 by construction.
        self.buf.push(value.len() as u8);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    /// Marshal a single value, aligning to its natural boundary first.
    pub(crate) fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Byte(v) => self.write_u8(*v),
            Value::Boolean(v) => self.write_u32(u32::from(*v)),
            Value::Int16(v) => self.write_u16(*v as u16),
            Value::UInt16(v) => self.write_u16(*v),
            Value::Int32(v) => self.write_u32(*v as u32),
            Value::UInt32(v) => self.write_u32(*v),
            Value::Int64(v) => self.write_u64(*v as u64),
            Value::UInt64(v) => self.write_u64(*v as u64),
            Value::Double(v) => self.write_u64(v.to_bits()),
            Value::UnixFd(v) => self.write_u32(*v),
            Value::String(v) => self.write_str(v)?,
            Value::ObjectPath(v) => self.write_str(v.as_str())?,
            Value::Signature(v) => self.write_signature(v),
            Value::Array(array) => {
                let mut expected = Vec::new();

                self.write_array(array.element().alignment(), |w| {
                    for item in array.values() {
                        expected.clear();
                        item.write_signature(&mut expected);

                        if expected != array.element().as_bytes() {
                            return Err(Error::new(ErrorKind::ValueSignatureMismatch));
                        }

                        w.write_value(item)?;
                    }

                    Ok(())
                })?;
            }
            Value::Struct(fields) => {
                // An empty struct has no valid signature; this is caught
                // before marshalling when the message signature is built.
                self.align(8);

                for field in fields {
                    self.write_value(field)?;
                }
            }
            Value::Dict(dict) => {
                let mut expected = Vec::new();

                // Dict entries align to 8 like structs.
                self.write_array(8, |w| {
                    for (key, value) in dict.entries() {
                        expected.clear();
                        key.write_signature(&mut expected);
                        value.write_signature(&mut expected);

                        let matches = expected.len()
                            == dict.key().len() + dict.value().len()
                            && expected[..dict.key().len()] == *dict.key().as_bytes()
                            && expected[dict.key().len()..] == *dict.value().as_bytes();

                        if !matches {
                            return Err(Error::new(ErrorKind::ValueSignatureMismatch));
                        }

                        // Dict entries are structs on the wire.
                        w.align(8);
                        w.write_value(key)?;
                        w.write_value(value)?;
                    }

                    Ok(())
                })?;
            }
            Value::Variant(inner) => {
                let signature = inner.signature()?;
                self.write_signature(&signature);
                self.write_value(inner)?;
            }
        }

        Ok(())
    }

    /// Write an array: aligned 32-bit byte count, padding to the element
    /// alignment, then the elements produced by `f`. The byte count
    /// excludes the element alignment padding.
    fn write_array(
        &mut self,
        element_alignment: usize,
        f: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.write_u32(0);
        let patch = self.buf.len() - 4;

        self.align(element_alignment);
        let start = self.buf.len();

        f(self)?;

        let len = self.buf.len() - start;

        let Ok(len) = u32::try_from(len) else {
            return Err(Error::new(ErrorKind::ArrayTooLong(u32::MAX)));
        };

        if len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        let bytes = match self.endianness {
            Endianness::BIG => len.to_be_bytes(),
            _ => len.to_le_bytes(),
        };

        self.buf[patch..patch + 4].copy_from_slice(&bytes);
        Ok(())
    }
}
