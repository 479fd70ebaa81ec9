//! An asynchronous D-Bus client core for the Tokio ecosystem.
//!
//! This crate speaks the D-Bus wire protocol over a Unix domain socket or a
//! TCP stream, authenticates via SASL and exposes an event-driven
//! request/response API for exchanging messages with a bus daemon or a peer.
//!
//! The pieces compose bottom-up: a [`Value`] model and signature-driven
//! codec, the four message kinds behind [`Message`], SASL authentication, a
//! handler [`Pipeline`] between the transport and the application, and a
//! [`Connection`] facade that owns serial allocation, reply correlation,
//! health checking and automatic reconnection.
//!
//! ```no_run
//! use busline::{Connection, Message, ObjectPath};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> busline::Result<()> {
//! const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");
//!
//! let c = Connection::session_bus().await?;
//!
//! let m = Message::method_call(PATH.into(), "GetId")
//!     .with_interface("org.freedesktop.DBus")
//!     .with_destination("org.freedesktop.DBus");
//!
//! let reply = c.send_request(m).await?;
//! println!("bus id: {:?}", reply.body().first());
//! c.close().await;
//! # Ok(()) }
//! ```

#![deny(missing_docs)]
#![allow(clippy::module_inception)]

#[macro_use]
mod macros;

#[doc(inline)]
pub use self::proto::{Endianness, Field, Flags, MessageType};
pub mod proto;

#[doc(inline)]
pub use self::error::{Error, ErrorCategory, Result};
mod error;

#[doc(inline)]
pub use self::signature::{Signature, SignatureBuf, SignatureError};
mod signature;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathBuf, ObjectPathError};
mod object_path;

#[doc(inline)]
pub use self::value::Value;
pub mod value;

pub(crate) mod codec;

#[doc(inline)]
pub use self::message::{Fds, Message, MessageKind};
mod message;

pub(crate) mod frame;

pub mod sasl;

#[doc(inline)]
pub use self::transport::{Address, Endpoint};
pub(crate) mod transport;

#[doc(inline)]
pub use self::pipeline::{
    Context, DuplexHandler, InboundHandler, OutboundHandler, Pipeline,
};
pub mod pipeline;

#[doc(inline)]
pub use self::connection::{
    Config, Connection, ConnectionBuilder, ConnectionEvent, ConnectionState, ListenerId,
};
mod connection;

pub mod org_freedesktop_dbus;

mod lossy_str;

mod utils;
