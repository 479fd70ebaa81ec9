use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ErrorKind;
use crate::org_freedesktop_dbus::ERROR_FAILED;
use crate::proto::Flags;
use crate::value::Value;
use crate::{Message, MessageKind, ObjectPath};

use super::{Context, InboundHandler, OutboundHandler, Pipeline};

const PATH: &ObjectPath = ObjectPath::new_const(b"/com/example/App");

fn call(member: &str, serial: u32) -> Message {
    Message::method_call(PATH.into(), member)
        .with_serial(NonZeroU32::new(serial).unwrap())
        .with_sender(":1.9")
}

/// Records the order in which stages saw messages.
struct Recorder {
    label: &'static str,
    seen: Arc<Mutex<Vec<String>>>,
}

impl InboundHandler for Recorder {
    fn message_received(&mut self, ctx: &mut Context<'_>, message: Message) {
        let MessageKind::MethodCall { member, .. } = message.kind() else {
            return;
        };

        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.label, member));
        ctx.forward(message);
    }
}

impl OutboundHandler for Recorder {
    fn write(&mut self, ctx: &mut Context<'_>, message: Message) {
        self.seen.lock().unwrap().push(format!("{}:out", self.label));
        ctx.forward(message);
    }
}

#[test]
fn inbound_traverses_head_to_tail_in_fifo_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new();

    pipeline
        .add_last("a", Recorder { label: "a", seen: seen.clone() })
        .unwrap();
    pipeline
        .add_last("b", Recorder { label: "b", seen: seen.clone() })
        .unwrap();

    for n in 1..4 {
        pipeline.propagate_inbound(
            call(&format!("m{n}"), n).with_flags(Flags::NO_REPLY_EXPECTED),
        );
    }

    assert_eq!(
        *seen.lock().unwrap(),
        ["a:m1", "b:m1", "a:m2", "b:m2", "a:m3", "b:m3"]
    );
}

#[test]
fn add_first_prepends() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new();

    pipeline
        .add_last("late", Recorder { label: "late", seen: seen.clone() })
        .unwrap();
    pipeline
        .add_first("early", Recorder { label: "early", seen: seen.clone() })
        .unwrap();

    pipeline.propagate_inbound(call("m", 1).with_flags(Flags::NO_REPLY_EXPECTED));

    assert_eq!(*seen.lock().unwrap(), ["early:m", "late:m"]);
    assert_eq!(pipeline.stage_names(), ["early", "late"]);
}

#[test]
fn outbound_traverses_tail_to_head() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::new();

    pipeline
        .add_first_outbound("near-head", Recorder { label: "head-side", seen: seen.clone() })
        .unwrap();
    pipeline
        .add_last_outbound("near-tail", Recorder { label: "tail-side", seen: seen.clone() })
        .unwrap();

    let out = pipeline.propagate_outbound(call("m", 1));

    assert_eq!(out.len(), 1);
    assert_eq!(*seen.lock().unwrap(), ["tail-side:out", "head-side:out"]);
}

#[test]
fn unhandled_call_gets_default_error_reply() {
    let pipeline = Pipeline::new();
    let serial = NonZeroU32::new(77).unwrap();

    let out = pipeline.propagate_inbound(call("Unknown", 77));

    let [error] = &out[..] else {
        panic!("expected one outbound message, got {out:?}");
    };

    assert!(matches!(
        error.kind(),
        MessageKind::Error { error_name, reply_serial }
            if error_name == ERROR_FAILED && *reply_serial == serial
    ));
    assert_eq!(error.destination(), Some(":1.9"));
    assert!(matches!(error.body(), [Value::String(..)]));
}

#[test]
fn unhandled_without_reply_expected_is_dropped() {
    let pipeline = Pipeline::new();

    let out = pipeline.propagate_inbound(call("Unknown", 1).with_flags(Flags::NO_REPLY_EXPECTED));
    assert!(out.is_empty());

    let out = pipeline.propagate_inbound(
        Message::signal(PATH.into(), "com.example", "Changed")
            .with_serial(NonZeroU32::new(2).unwrap()),
    );
    assert!(out.is_empty());
}

/// Swallows calls for one member and answers them itself.
struct Responder;

impl InboundHandler for Responder {
    fn message_received(&mut self, ctx: &mut Context<'_>, message: Message) {
        if matches!(message.kind(), MessageKind::MethodCall { member, .. } if member == "Claimed") {
            let reply = message.method_return().unwrap();
            ctx.send(reply.with_body(vec![Value::UInt32(1)]));
            return;
        }

        ctx.forward(message);
    }
}

#[test]
fn handler_can_claim_and_respond() {
    let pipeline = Pipeline::new();
    pipeline.add_last("responder", Responder).unwrap();

    let out = pipeline.propagate_inbound(call("Claimed", 5));

    let [reply] = &out[..] else {
        panic!("expected one outbound message, got {out:?}");
    };

    assert!(matches!(
        reply.kind(),
        MessageKind::MethodReturn { reply_serial } if reply_serial.get() == 5
    ));
    assert_eq!(reply.body(), [Value::UInt32(1)]);
}

/// Rewrites the destination of every outbound message.
struct Rewriter;

impl OutboundHandler for Rewriter {
    fn write(&mut self, ctx: &mut Context<'_>, message: Message) {
        ctx.forward(message.with_destination("com.example.Proxy"));
    }
}

#[test]
fn outbound_handler_can_mutate() {
    let pipeline = Pipeline::new();
    pipeline.add_last_outbound("rewrite", Rewriter).unwrap();

    let out = pipeline.propagate_outbound(call("m", 1).with_destination("com.example.Direct"));
    assert_eq!(out[0].destination(), Some("com.example.Proxy"));
}

/// Swallows everything.
struct Sink;

impl OutboundHandler for Sink {
    fn write(&mut self, _: &mut Context<'_>, _: Message) {}
}

#[test]
fn swallowed_outbound_message_reaches_nothing() {
    let pipeline = Pipeline::new();
    pipeline.add_last_outbound("sink", Sink).unwrap();

    assert!(pipeline.propagate_outbound(call("m", 1)).is_empty());
}

#[test]
fn duplicate_and_reserved_names_fail() {
    let pipeline = Pipeline::new();
    pipeline.add_last("x", Responder).unwrap();

    let err = pipeline.add_last("x", Responder).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::DuplicateStage(..)));

    for reserved in ["head", "tail"] {
        let err = pipeline.add_last(reserved, Responder).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ReservedStage(..)));
    }
}

#[test]
fn remove_detaches_a_stage() {
    let pipeline = Pipeline::new();
    pipeline.add_last("x", Responder).unwrap();
    pipeline.remove("x").unwrap();

    assert!(pipeline.stage_names().is_empty());

    let err = pipeline.remove("x").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnknownStage(..)));

    // With the responder gone the call falls through to the tail.
    let out = pipeline.propagate_inbound(call("Claimed", 9));
    assert!(matches!(out[0].kind(), MessageKind::Error { .. }));
}

/// Counts lifecycle notifications.
#[derive(Default)]
struct Lifecycle {
    active: Arc<AtomicU32>,
    inactive: Arc<AtomicU32>,
    failures: Arc<AtomicU32>,
    events: Arc<AtomicU32>,
}

impl InboundHandler for Lifecycle {
    fn connection_active(&mut self, _: &mut Context<'_>) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn connection_inactive(&mut self, _: &mut Context<'_>) {
        self.inactive.fetch_add(1, Ordering::SeqCst);
    }

    fn failure_caught(&mut self, _: &mut Context<'_>, _: &crate::Error) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn user_event(&mut self, _: &mut Context<'_>, event: &(dyn std::any::Any + Send + Sync)) {
        if event.downcast_ref::<&str>().is_some() {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn lifecycle_notifications_reach_handlers() {
    let handler = Lifecycle::default();
    let active = handler.active.clone();
    let inactive = handler.inactive.clone();
    let failures = handler.failures.clone();
    let events = handler.events.clone();

    let pipeline = Pipeline::new();
    pipeline.add_last("lifecycle", handler).unwrap();

    pipeline.propagate_connection_active();
    pipeline.propagate_connection_inactive();
    pipeline.propagate_inbound_failure(&crate::error::ErrorKind::Disconnected.into());
    pipeline.propagate_user_event(&"ping");

    assert_eq!(active.load(Ordering::SeqCst), 1);
    assert_eq!(inactive.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(events.load(Ordering::SeqCst), 1);
}
