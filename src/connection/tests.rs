#![cfg(unix)]

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use crate::error::{ErrorCategory, ErrorKind};
use crate::frame::{encode_message, FrameDecoder};
use crate::org_freedesktop_dbus::{self, ERROR_FAILED};
use crate::proto::{Endianness, Flags, MAX_MESSAGE_LENGTH};
use crate::transport::Address;
use crate::value::Value;
use crate::{Message, MessageKind, ObjectPath};

use super::{Config, ConnectionBuilder, ConnectionEvent, ConnectionState};

const GUID: &str = "a8a9e91679e618c1eed16b7c01a44c21";
const BUS_ID: &str = "0123456789abcdef0123456789abcdef";

/// What the scripted bus does beyond the standard Hello/GetId handling.
#[derive(Default)]
struct ServerOptions {
    /// Answer `Peer.Ping`; tests of the health monitor turn this off.
    ignore_ping: bool,
    /// After answering Hello, push an `UnknownMethod` call to the client
    /// and forward the client's reply to this channel.
    push_call: Option<mpsc::UnboundedSender<Message>>,
}

/// Bind a scripted bus in a temporary directory and return an address for
/// it. The server accepts any number of consecutive connections.
fn spawn_server(options: ServerOptions) -> (tempfile::TempDir, Address) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bus.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let address = Address::parse(&format!("unix:path={}", path.display())).unwrap();

    tokio::spawn(run_server(listener, options));

    (dir, address)
}

async fn run_server(listener: UnixListener, mut options: ServerOptions) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };

        let mut carry = Vec::new();

        if server_auth(&mut stream, &mut carry).await.is_err() {
            continue;
        }

        serve_connection(&mut stream, carry, &mut options).await;
    }
}

/// Walk the client through EXTERNAL authentication and FD negotiation.
async fn server_auth(stream: &mut UnixStream, carry: &mut Vec<u8>) -> std::io::Result<()> {
    let nul_and_auth = read_line(stream, carry).await?;
    assert_eq!(nul_and_auth.first(), Some(&0));
    assert!(nul_and_auth[1..].starts_with(b"AUTH "));

    stream
        .write_all(format!("OK {GUID}\r\n").as_bytes())
        .await?;

    let negotiate = read_line(stream, carry).await?;
    assert!(negotiate.starts_with(b"NEGOTIATE_UNIX_FD"));
    stream.write_all(b"AGREE_UNIX_FD\r\n").await?;

    let begin = read_line(stream, carry).await?;
    assert!(begin.starts_with(b"BEGIN"));
    Ok(())
}

async fn read_line(stream: &mut UnixStream, carry: &mut Vec<u8>) -> std::io::Result<Vec<u8>> {
    loop {
        if let Some(n) = carry.iter().position(|&b| b == b'\n') {
            let rest = carry.split_off(n + 1);
            return Ok(std::mem::replace(carry, rest));
        }

        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;

        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }

        carry.extend_from_slice(&chunk[..n]);
    }
}

async fn read_frame(
    stream: &mut UnixStream,
    carry: &mut Vec<u8>,
    decoder: &FrameDecoder,
) -> Option<Message> {
    let mut fds = VecDeque::new();

    loop {
        match decoder.decode(carry, &mut fds) {
            Ok(Some((message, consumed))) => {
                carry.drain(..consumed);
                return Some(message);
            }
            Ok(None) => {}
            Err(_) => return None,
        }

        let mut chunk = [0u8; 4096];

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => carry.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn write_frame(stream: &mut UnixStream, message: &Message) {
    let frame = encode_message(message, Endianness::NATIVE, MAX_MESSAGE_LENGTH).unwrap();
    stream.write_all(&frame.bytes).await.unwrap();
}

async fn serve_connection(
    stream: &mut UnixStream,
    mut carry: Vec<u8>,
    options: &mut ServerOptions,
) {
    let decoder = FrameDecoder::new(MAX_MESSAGE_LENGTH);
    let mut serial = 1000u32;

    let mut next_serial = move || {
        serial += 1;
        NonZeroU32::new(serial).unwrap()
    };

    while let Some(message) = read_frame(stream, &mut carry, &decoder).await {
        match message.kind().clone() {
            MessageKind::MethodCall { member, .. } => match member.as_str() {
                "Hello" => {
                    let reply = message
                        .method_return()
                        .unwrap()
                        .with_serial(next_serial())
                        .with_body(vec![Value::String(":1.42".into())]);
                    write_frame(stream, &reply).await;

                    if options.push_call.is_some() {
                        let call = Message::method_call(
                            ObjectPath::new_const(b"/com/example/App").into(),
                            "UnknownMethod",
                        )
                        .with_serial(next_serial())
                        .with_sender(":1.99")
                        .with_destination(":1.42");
                        write_frame(stream, &call).await;
                    }
                }
                "GetId" => {
                    let reply = message
                        .method_return()
                        .unwrap()
                        .with_serial(next_serial())
                        .with_body(vec![Value::String(BUS_ID.into())]);
                    write_frame(stream, &reply).await;
                }
                "Ping" if !options.ignore_ping => {
                    let reply = message.method_return().unwrap().with_serial(next_serial());
                    write_frame(stream, &reply).await;
                }
                "Ping" => {}
                "Boom" => {
                    let reply = message
                        .error(ERROR_FAILED, "kaboom")
                        .unwrap()
                        .with_serial(next_serial());
                    write_frame(stream, &reply).await;
                }
                "Sleep" => {}
                "Quit" => return,
                _ => {}
            },
            MessageKind::Error { .. } => {
                if let Some(push) = &options.push_call {
                    let _ = push.send(message);
                }
            }
            _ => {}
        }
    }
}

fn test_config() -> Config {
    Config {
        connect_timeout: Duration::from_secs(5),
        method_call_timeout: Duration::from_secs(5),
        health_check_enabled: false,
        auto_reconnect_enabled: false,
        ..Config::default()
    }
}

fn connect_builder(address: Address) -> ConnectionBuilder {
    ConnectionBuilder::new().address(address).config(test_config())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_walks_the_state_machine() {
    let (_dir, address) = spawn_server(ServerOptions::default());

    let connection = connect_builder(address).build().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let events = seen.clone();
    connection.add_event_listener(move |event| {
        events.lock().unwrap().push(event.clone());
    });

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    connection.connect().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.unique_name().as_deref(), Some(":1.42"));
    assert_eq!(connection.server_guid().as_deref(), Some(GUID));

    wait_until(|| {
        let seen = seen.lock().unwrap();

        let states = seen
            .iter()
            .filter_map(|event| match event {
                ConnectionEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect::<Vec<_>>();

        let authenticated = seen.iter().any(|event| {
            matches!(event, ConnectionEvent::Authenticated { guid } if guid == GUID)
        });

        states
            == [
                ConnectionState::Connecting,
                ConnectionState::Authenticating,
                ConnectionState::Connected,
            ]
            && authenticated
    })
    .await;

    connection.close().await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn get_id_round_trip() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    // An explicit serial makes the reply correlation observable.
    let serial = connection.next_serial();

    let call = Message::method_call(org_freedesktop_dbus::PATH.into(), "GetId")
        .with_interface(org_freedesktop_dbus::INTERFACE)
        .with_destination(org_freedesktop_dbus::DESTINATION)
        .with_serial(serial);

    let reply = connection.send_request(call).await.unwrap();

    assert!(matches!(
        reply.kind(),
        MessageKind::MethodReturn { reply_serial } if *reply_serial == serial
    ));

    let [Value::String(id)] = reply.body() else {
        panic!("expected a single string, got {:?}", reply.body());
    };

    assert_eq!(id.len(), 32);
    assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));

    connection.close().await;
}

#[tokio::test]
async fn unknown_inbound_call_is_answered_with_an_error() {
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();

    let (_dir, address) = spawn_server(ServerOptions {
        push_call: Some(error_tx),
        ..ServerOptions::default()
    });

    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    let error = tokio::time::timeout(Duration::from_secs(5), error_rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        error.kind(),
        MessageKind::Error { error_name, reply_serial }
            if error_name == ERROR_FAILED && reply_serial.get() == 1002
    ));
    assert!(matches!(error.body(), [Value::String(..)]));

    connection.close().await;
}

#[tokio::test]
async fn remote_error_surfaces_on_the_request_future() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    let call = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "Boom")
        .with_destination(org_freedesktop_dbus::DESTINATION);

    let error = connection.send_request(call).await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::Remote);
    assert_eq!(error.error_name(), Some(ERROR_FAILED));
    assert_eq!(error.remote_message(), Some("kaboom"));

    connection.close().await;
}

#[tokio::test]
async fn timed_out_call_leaves_the_connection_usable() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    let call = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "Sleep")
        .with_destination(org_freedesktop_dbus::DESTINATION);

    let start = Instant::now();
    let error = connection
        .send_request_with_timeout(call, Duration::from_millis(100))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(error.category(), ErrorCategory::MethodTimedOut);
    assert!(
        elapsed >= Duration::from_millis(80) && elapsed <= Duration::from_millis(500),
        "timed out after {elapsed:?}"
    );

    // The timed out serial is gone; unrelated calls still work.
    assert_eq!(connection.inner_in_flight(), 0);

    let call = Message::method_call(org_freedesktop_dbus::PATH.into(), "GetId")
        .with_destination(org_freedesktop_dbus::DESTINATION);
    connection.send_request(call).await.unwrap();

    connection.close().await;
}

#[tokio::test]
async fn close_fails_pending_requests() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    let call = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "Sleep")
        .with_destination(org_freedesktop_dbus::DESTINATION);

    let pending = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.send_request(call).await })
    };

    wait_until(|| connection.inner_in_flight() == 1).await;
    connection.close().await;

    let error = pending.await.unwrap().unwrap_err();
    assert_eq!(error.category(), ErrorCategory::Disconnected);

    let call = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "Late");
    let error = connection.send(call).await.unwrap_err();
    assert_eq!(error.category(), ErrorCategory::NotConnected);
}

#[tokio::test]
async fn reconnects_after_transport_loss() {
    let (_dir, address) = spawn_server(ServerOptions::default());

    let config = Config {
        auto_reconnect_enabled: true,
        reconnect_initial_delay: Duration::from_millis(50),
        max_reconnect_attempts: 5,
        ..test_config()
    };

    let connection = ConnectionBuilder::new()
        .address(address)
        .config(config)
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let events = seen.clone();
    connection.add_event_listener(move |event| {
        if let ConnectionEvent::StateChanged { to, .. } = event {
            events.lock().unwrap().push(*to);
        }
    });

    connection.connect().await.unwrap();

    // Ask the server to drop the connection underneath us.
    let quit = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "Quit")
        .with_destination(org_freedesktop_dbus::DESTINATION)
        .with_flags(Flags::NO_REPLY_EXPECTED);
    connection.send(quit).await.unwrap();

    wait_until(|| {
        let seen = seen.lock().unwrap();

        let failed = seen.iter().position(|state| *state == ConnectionState::Failed);
        let reconnecting = seen
            .iter()
            .position(|state| *state == ConnectionState::Reconnecting);

        match (failed, reconnecting) {
            (Some(failed), Some(reconnecting)) if reconnecting > failed => seen
                [reconnecting..]
                .contains(&ConnectionState::Connected),
            _ => false,
        }
    })
    .await;

    // And the reconnected session is usable.
    let call = Message::method_call(org_freedesktop_dbus::PATH.into(), "GetId")
        .with_destination(org_freedesktop_dbus::DESTINATION);
    connection.send_request(call).await.unwrap();

    connection.close().await;
}

#[tokio::test]
async fn health_monitor_degrades_and_fails() {
    let (_dir, address) = spawn_server(ServerOptions {
        ignore_ping: true,
        ..ServerOptions::default()
    });

    let config = Config {
        health_check_enabled: true,
        health_check_interval: Duration::from_millis(100),
        health_check_timeout: Duration::from_millis(50),
        health_failure_threshold: 2,
        ..test_config()
    };

    let connection = ConnectionBuilder::new()
        .address(address)
        .config(config)
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let events = seen.clone();
    connection.add_event_listener(move |event| {
        if let ConnectionEvent::StateChanged { to, .. } = event {
            events.lock().unwrap().push(*to);
        }
    });

    connection.connect().await.unwrap();

    wait_until(|| {
        let seen = seen.lock().unwrap();
        seen.contains(&ConnectionState::Unhealthy) && seen.contains(&ConnectionState::Failed)
    })
    .await;

    connection.close().await;
}

#[tokio::test]
async fn request_without_reply_expected_is_refused() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();
    connection.connect().await.unwrap();

    let call = Message::method_call(ObjectPath::new_const(b"/com/example").into(), "M")
        .with_flags(Flags::NO_REPLY_EXPECTED);

    let error = connection.send_request(call).await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::NoReplyExpected));

    connection.close().await;
}

#[tokio::test]
async fn serials_strictly_increase() {
    let (_dir, address) = spawn_server(ServerOptions::default());
    let connection = connect_builder(address).build().unwrap();

    let mut last = 0;

    for _ in 0..64 {
        let serial = connection.next_serial().get();
        assert!(serial > last);
        last = serial;
    }
}

mod correlation {
    use std::time::Duration;

    use crate::connection::correlation::Correlation;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn back_pressure_blocks_then_rejects() {
        let correlation = std::sync::Arc::new(Correlation::new(1));

        let held = correlation.reserve().await.unwrap();

        // The next caller parks until capacity drains.
        let parked = tokio::spawn({
            let correlation = correlation.clone();
            async move { correlation.reserve().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!parked.is_finished());

        // With as many callers parked as can ever be in flight, further
        // callers are refused outright.
        let refused = correlation.reserve().await.unwrap_err();
        assert!(matches!(refused.kind(), ErrorKind::TooManyInFlight));

        drop(held);
        parked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn registry_entries_are_removed_on_completion() {
        let correlation = Correlation::new(4);

        let serial = correlation.next_serial();
        let _rx = correlation.register(serial);
        assert_eq!(correlation.in_flight(), 1);

        correlation.remove(serial);
        assert_eq!(correlation.in_flight(), 0);
    }

    #[tokio::test]
    async fn disconnect_fails_pending() {
        let correlation = Correlation::new(4);

        let serial = correlation.next_serial();
        let rx = correlation.register(serial);

        correlation.disconnect_all();

        let result = rx.await.unwrap();
        assert!(matches!(
            result.unwrap_err().kind(),
            ErrorKind::Disconnected
        ));
    }
}
