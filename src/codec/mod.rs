//! Marshalling and unmarshalling of values against a message buffer.
//!
//! Alignment in D-Bus is relative to the start of the message, so both the
//! writer and the reader operate on the whole message buffer and track
//! absolute offsets.

#[cfg(test)]
mod tests;

pub(crate) use self::reader::BodyReader;
mod reader;

pub(crate) use self::writer::BodyWriter;
mod writer;
