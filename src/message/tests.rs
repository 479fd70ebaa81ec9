use std::num::NonZeroU32;

use crate::proto::Flags;
use crate::value::Value;
use crate::{Message, MessageKind, ObjectPath};

const PATH: &ObjectPath = ObjectPath::new_const(b"/com/example/App");

#[test]
fn reply_swaps_sender_and_destination() {
    let serial = NonZeroU32::new(11).unwrap();

    let call = Message::method_call(PATH.into(), "Frobnicate")
        .with_serial(serial)
        .with_sender(":1.7")
        .with_destination("com.example.App");

    let reply = call.method_return().unwrap();

    assert!(matches!(
        reply.kind(),
        MessageKind::MethodReturn { reply_serial } if *reply_serial == serial
    ));
    assert_eq!(reply.destination(), call.sender());
    assert_eq!(reply.sender(), call.destination());
    assert_eq!(reply.serial(), None);
}

#[test]
fn error_reply_carries_message_body() {
    let call = Message::method_call(PATH.into(), "Frobnicate")
        .with_serial(NonZeroU32::new(3).unwrap());

    let error = call
        .error("org.freedesktop.DBus.Error.Failed", "no such method")
        .unwrap();

    assert!(matches!(
        error.kind(),
        MessageKind::Error { error_name, .. } if error_name == "org.freedesktop.DBus.Error.Failed"
    ));
    assert_eq!(error.body()[0].as_str(), Some("no such method"));
}

#[test]
fn replying_requires_a_serial() {
    let call = Message::method_call(PATH.into(), "Frobnicate");
    assert!(call.method_return().is_none());
    assert!(call.error("com.example.Error", "nope").is_none());
}

#[test]
fn reply_expected_tracks_flags() {
    let call = Message::method_call(PATH.into(), "Frobnicate");
    assert!(call.reply_expected());

    let call = call.with_flags(Flags::NO_REPLY_EXPECTED);
    assert!(!call.reply_expected());

    let signal = Message::signal(PATH.into(), "com.example.App", "Changed");
    assert!(!signal.reply_expected());
}

#[test]
fn signature_concatenates_body_values() {
    let m = Message::method_call(PATH.into(), "M").with_body(vec![
        Value::UInt32(1),
        Value::String("two".into()),
        Value::Struct(vec![Value::Byte(3), Value::Boolean(false)]),
    ]);

    assert_eq!(m.signature().unwrap().as_str(), "us(yb)");
}

#[cfg(unix)]
#[test]
fn fds_are_taken_at_most_once() {
    use std::fs::File;
    use std::os::fd::OwnedFd;

    let call = Message::method_call(PATH.into(), "SendHandle");

    let fd: OwnedFd = File::open("/dev/null").unwrap().into();
    let index = call.fds().push(fd);
    assert_eq!(index, 0);
    assert_eq!(call.fds().len(), 1);

    // A clone shares the table; whoever takes first wins, and the slot
    // stays claimed.
    let cloned = call.clone();
    assert!(cloned.fds().take(index).is_some());
    assert!(call.fds().take(index).is_none());
    assert!(call.fds().take(7).is_none());
}

#[test]
fn signal_has_interface() {
    let signal = Message::signal(PATH.into(), "com.example.App", "Changed");
    assert_eq!(signal.interface(), Some("com.example.App"));
    assert!(matches!(signal.kind(), MessageKind::Signal { member, .. } if member == "Changed"));
}
