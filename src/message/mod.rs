#[cfg(test)]
mod tests;

pub use self::fds::Fds;
mod fds;

pub use self::message_kind::MessageKind;
mod message_kind;

pub use self::message::Message;
mod message;
