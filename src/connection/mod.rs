//! The connection facade and its moving parts.

#[cfg(test)]
mod tests;

pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::config::Config;
mod config;

pub use self::connection::Connection;
mod connection;

pub use self::event::{ConnectionEvent, ListenerId};
mod event;

pub use self::state::ConnectionState;
mod state;

mod correlation;
mod health;
mod io;
mod reconnect;
