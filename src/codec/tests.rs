use crate::error::ErrorKind;
use crate::proto::Endianness;
use crate::signature::Signature;
use crate::value::{Array, Dict, Value};

use super::{BodyReader, BodyWriter};

fn round_trip(value: &Value, endianness: Endianness) {
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, endianness);
    writer.write_value(value).unwrap();

    let signature = value.signature().unwrap();
    let mut reader = BodyReader::new(&buf, 0, endianness);
    let decoded = reader.read_value(&signature).unwrap();

    assert_eq!(&decoded, value, "{signature} ({endianness:?})");
    assert!(reader.is_empty(), "{signature}: trailing bytes");
}

fn sample_values() -> Vec<Value> {
    let mut strings = Array::new(Signature::STRING).unwrap();
    strings.push(Value::String("first".into())).unwrap();
    strings.push(Value::String("second".into())).unwrap();

    let empty = Array::new(Signature::new(b"(ii)").unwrap()).unwrap();

    let mut nested = Array::new(Signature::new(b"ay").unwrap()).unwrap();
    let mut inner = Array::new(Signature::new(b"y").unwrap()).unwrap();
    inner.push(Value::Byte(1)).unwrap();
    nested.push(Value::Array(inner)).unwrap();

    let mut dict = Dict::new(Signature::STRING, Signature::VARIANT).unwrap();
    dict.insert(
        Value::String("level".into()),
        Value::Variant(Box::new(Value::UInt32(7))),
    )
    .unwrap();
    dict.insert(
        Value::String("name".into()),
        Value::Variant(Box::new(Value::String("qux".into()))),
    )
    .unwrap();

    vec![
        Value::Byte(0xff),
        Value::Boolean(true),
        Value::Boolean(false),
        Value::Int16(-2),
        Value::UInt16(0xbeef),
        Value::Int32(-70000),
        Value::UInt32(0xdead_beef),
        Value::Int64(i64::MIN),
        Value::UInt64(u64::MAX),
        Value::Double(core::f64::consts::PI),
        Value::UnixFd(3),
        Value::String(String::new()),
        Value::String("Hello World!".into()),
        Value::ObjectPath(crate::ObjectPath::new(b"/org/freedesktop/DBus").unwrap().to_owned()),
        Value::Signature(crate::SignatureBuf::new(b"a{sv}").unwrap()),
        Value::Array(strings),
        Value::Array(empty),
        Value::Array(nested),
        Value::Struct(vec![Value::Byte(1), Value::UInt64(2), Value::Byte(3)]),
        Value::Dict(dict),
        Value::Variant(Box::new(Value::Struct(vec![
            Value::String("x".into()),
            Value::Int32(-1),
        ]))),
    ]
}

#[test]
fn round_trip_values() {
    for value in sample_values() {
        round_trip(&value, Endianness::LITTLE);
        round_trip(&value, Endianness::BIG);
    }
}

#[test]
fn round_trip_sequences() {
    // All sample values in a row, exercising inter-value alignment.
    let values = sample_values();

    for endianness in [Endianness::LITTLE, Endianness::BIG] {
        let mut buf = Vec::new();
        let mut writer = BodyWriter::new(&mut buf, endianness);

        for value in &values {
            writer.write_value(value).unwrap();
        }

        let mut reader = BodyReader::new(&buf, 0, endianness);

        for value in &values {
            let signature = value.signature().unwrap();
            assert_eq!(&reader.read_value(&signature).unwrap(), value);
        }

        assert!(reader.is_empty());
    }
}

#[test]
fn alignment_is_message_relative() {
    // A byte followed by a u32 pads three bytes; the u32 payload begins at
    // offset 4.
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::LITTLE);
    writer.write_value(&Value::Byte(1)).unwrap();
    writer.write_value(&Value::UInt32(2)).unwrap();

    assert_eq!(buf, [1, 0, 0, 0, 2, 0, 0, 0]);
}

#[test]
fn padding_bytes_are_zero() {
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::LITTLE);
    writer.write_value(&Value::Byte(0xff)).unwrap();
    writer
        .write_value(&Value::Struct(vec![Value::Byte(0xff), Value::UInt64(u64::MAX)]))
        .unwrap();

    // Offsets 1..8 pad the struct, 9..16 pad its u64 field.
    assert_eq!(&buf[1..8], &[0u8; 7]);
    assert_eq!(&buf[9..16], &[0u8; 7]);
}

#[test]
fn array_length_excludes_element_padding() {
    // a(ii): length field at 0, padding at 4..8, one 8-byte struct.
    let mut array = Array::new(Signature::new(b"(ii)").unwrap()).unwrap();
    array
        .push(Value::Struct(vec![Value::Int32(1), Value::Int32(2)]))
        .unwrap();

    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::LITTLE);
    writer.write_value(&Value::Array(array)).unwrap();

    assert_eq!(buf.len(), 16);
    assert_eq!(&buf[..4], &8u32.to_le_bytes());
}

#[test]
fn boolean_is_strict() {
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::LITTLE);
    writer.write_value(&Value::UInt32(2)).unwrap();

    let mut reader = BodyReader::new(&buf, 0, Endianness::LITTLE);
    let err = reader.read_value(Signature::new_const(b"b")).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidBoolean(2)));
}

#[test]
fn truncated_value_is_rejected() {
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::LITTLE);
    writer.write_value(&Value::UInt32(7)).unwrap();

    let mut reader = BodyReader::new(&buf[..3], 0, Endianness::LITTLE);
    let err = reader.read_value(Signature::new_const(b"u")).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Truncated));
}

#[test]
fn string_must_be_nul_terminated() {
    let mut buf = 2u32.to_le_bytes().to_vec();
    buf.extend_from_slice(b"hi");
    buf.push(1);

    let mut reader = BodyReader::new(&buf, 0, Endianness::LITTLE);
    let err = reader.read_value(Signature::STRING).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotNullTerminated));
}

#[test]
fn array_element_mismatch_is_rejected() {
    let mut array = Array::new(Signature::STRING).unwrap();
    let err = array.push(Value::UInt32(1)).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ValueSignatureMismatch));
}

#[test]
fn empty_struct_has_no_signature() {
    assert!(Value::Struct(Vec::new()).signature().is_err());
}

#[test]
fn big_endian_layout() {
    let mut buf = Vec::new();
    let mut writer = BodyWriter::new(&mut buf, Endianness::BIG);
    writer.write_value(&Value::UInt32(0x0102_0304)).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);
}
