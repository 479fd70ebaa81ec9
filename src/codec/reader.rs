use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{Endianness, Type, MAX_ARRAY_LENGTH};
use crate::signature::Signature;
use crate::utils::padding_to;
use crate::value::{Array, Dict, Value};

/// A reader unmarshalling values from a message buffer.
///
/// The buffer must start at the first byte of the message header so that
/// absolute alignment comes out right; reading begins at `pos`.
pub(crate) struct BodyReader<'a> {
    data: &'a [u8],
    pos: usize,
    endianness: Endianness,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize, endianness: Endianness) -> Self {
        Self {
            data,
            pos,
            endianness,
        }
    }

    /// The current absolute offset.
    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    /// Test if the reader is exhausted.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Skip padding up to the given alignment.
    pub(crate) fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = padding_to(alignment, self.pos);

        if self.pos + padding > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        self.pos += padding;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let Some(bytes) = self.data.get(self.pos..self.pos + n) else {
            return Err(Error::new(ErrorKind::Truncated));
        };

        self.pos += n;
        Ok(bytes)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        let bytes: [u8; 2] = self.take(2)?.try_into().unwrap();

        Ok(match self.endianness {
            Endianness::BIG => u16::from_be_bytes(bytes),
            _ => u16::from_le_bytes(bytes),
        })
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();

        Ok(match self.endianness {
            Endianness::BIG => u32::from_be_bytes(bytes),
            _ => u32::from_le_bytes(bytes),
        })
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();

        Ok(match self.endianness {
            Endianness::BIG => u64::from_be_bytes(bytes),
            _ => u64::from_le_bytes(bytes),
        })
    }

    /// Read a string payload: 32-bit length, bytes, NUL.
    pub(crate) fn read_str(&mut self) -> Result<&'a str> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len + 1)?;

        let (bytes, [0]) = bytes.split_at(len) else {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        };

        if bytes.contains(&0) {
            return Err(Error::new(ErrorKind::EmbeddedNull));
        }

        Ok(std::str::from_utf8(bytes)?)
    }

    /// Read a signature payload: 8-bit length, bytes, NUL.
    pub(crate) fn read_signature(&mut self) -> Result<&'a Signature> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len + 1)?;

        let (bytes, [0]) = bytes.split_at(len) else {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        };

        Ok(Signature::new(bytes)?)
    }

    /// Unmarshal one value described by `signature`, which must be a single
    /// complete type.
    pub(crate) fn read_value(&mut self, signature: &Signature) -> Result<Value> {
        let bytes = signature.as_bytes();

        let Some(&code) = bytes.first() else {
            return Err(Error::new(ErrorKind::Truncated));
        };

        Ok(match Type::new(code) {
            Type::BYTE => Value::Byte(self.read_u8()?),
            Type::BOOLEAN => match self.read_u32()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                value => return Err(Error::new(ErrorKind::InvalidBoolean(value))),
            },
            Type::INT16 => Value::Int16(self.read_u16()? as i16),
            Type::UINT16 => Value::UInt16(self.read_u16()?),
            Type::INT32 => Value::Int32(self.read_u32()? as i32),
            Type::UINT32 => Value::UInt32(self.read_u32()?),
            Type::INT64 => Value::Int64(self.read_u64()? as i64),
            Type::UINT64 => Value::UInt64(self.read_u64()?),
            Type::DOUBLE => Value::Double(f64::from_bits(self.read_u64()?)),
            Type::UNIX_FD => Value::UnixFd(self.read_u32()?),
            Type::STRING => Value::String(self.read_str()?.into()),
            Type::OBJECT_PATH => {
                let path = self.read_str()?;
                Value::ObjectPath(ObjectPath::new(path.as_bytes())?.to_owned())
            }
            Type::SIGNATURE => Value::Signature(self.read_signature()?.to_owned()),
            Type::VARIANT => {
                let inner = self.read_signature()?;
                let mut iter = inner.iter();

                let (Some(single), None) = (iter.next(), iter.next()) else {
                    return Err(Error::new(ErrorKind::Truncated));
                };

                Value::Variant(Box::new(self.read_value(single)?))
            }
            Type::ARRAY => {
                // SAFETY: the tail of an array signature is its element
                // type, itself a valid signature.
                let element = unsafe { Signature::new_unchecked(&bytes[1..]) };
                self.read_array(element)?
            }
            Type::OPEN_PAREN => {
                // SAFETY: the interior of a struct signature is a valid
                // sequence of complete types.
                let fields = unsafe { Signature::new_unchecked(&bytes[1..bytes.len() - 1]) };

                self.align(8)?;
                let mut values = Vec::new();

                for field in fields.iter() {
                    values.push(self.read_value(field)?);
                }

                Value::Struct(values)
            }
            _ => return Err(Error::new(ErrorKind::Truncated)),
        })
    }

    /// Read an array given its element signature. Dict entries come back as
    /// a [`Value::Dict`], anything else as a [`Value::Array`].
    fn read_array(&mut self, element: &Signature) -> Result<Value> {
        let len = self.read_u32()?;

        if len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        // The byte count excludes padding up to the first element.
        self.align(element.alignment())?;
        let end = self.pos + len as usize;

        if end > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        let bytes = element.as_bytes();

        if let [b'{', interior @ .., b'}'] = bytes {
            // SAFETY: the interior of a dict entry is a key followed by a
            // value type, each a valid signature on its own.
            let interior = unsafe { Signature::new_unchecked(interior) };
            let mut iter = interior.iter();

            let (Some(key), Some(value), None) = (iter.next(), iter.next(), iter.next()) else {
                return Err(Error::new(ErrorKind::Truncated));
            };

            let mut dict = Dict::new(key, value)?;

            while self.pos < end {
                self.align(8)?;
                let k = self.read_value(key)?;
                let v = self.read_value(value)?;
                dict.insert(k, v)?;
            }

            if self.pos != end {
                return Err(Error::new(ErrorKind::Truncated));
            }

            return Ok(Value::Dict(dict));
        }

        let mut array = Array::new(element)?;

        while self.pos < end {
            array.push(self.read_value(element)?)?;
        }

        if self.pos != end {
            return Err(Error::new(ErrorKind::Truncated));
        }

        Ok(Value::Array(array))
    }
}
