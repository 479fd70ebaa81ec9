use std::any::Any;

use crate::error::Error;
use crate::message::Message;

use super::Context;

/// A handler observing the inbound direction of a [`Pipeline`].
///
/// Every method has a forwarding default, so implementations only override
/// what they care about.
///
/// [`Pipeline`]: crate::Pipeline
#[allow(unused_variables)]
pub trait InboundHandler: Send {
    /// A message travelling from the transport towards the application.
    ///
    /// The default forwards it unchanged. Implementations may forward a
    /// mutated message, swallow it by returning without forwarding, or
    /// respond through [`Context::send`].
    fn message_received(&mut self, ctx: &mut Context<'_>, message: Message) {
        ctx.forward(message);
    }

    /// A connection-fatal failure was observed. Every inbound handler is
    /// notified.
    fn failure_caught(&mut self, ctx: &mut Context<'_>, error: &Error) {}

    /// The connection reached the CONNECTED state.
    fn connection_active(&mut self, ctx: &mut Context<'_>) {}

    /// The connection left the CONNECTED state.
    fn connection_inactive(&mut self, ctx: &mut Context<'_>) {}

    /// An application defined event fired through
    /// [`Pipeline::propagate_user_event`].
    ///
    /// [`Pipeline::propagate_user_event`]: crate::Pipeline::propagate_user_event
    fn user_event(&mut self, ctx: &mut Context<'_>, event: &(dyn Any + Send + Sync)) {}
}

/// A handler observing the outbound direction of a [`Pipeline`].
///
/// [`Pipeline`]: crate::Pipeline
pub trait OutboundHandler: Send {
    /// A message travelling from the application towards the transport.
    ///
    /// The default forwards it unchanged; not forwarding swallows the
    /// message, which completes the originating send without writing
    /// anything.
    fn write(&mut self, ctx: &mut Context<'_>, message: Message) {
        ctx.forward(message);
    }
}

/// A handler participating in both directions.
///
/// Implemented automatically for anything that is both an
/// [`InboundHandler`] and an [`OutboundHandler`].
pub trait DuplexHandler: InboundHandler + OutboundHandler {}

impl<T> DuplexHandler for T where T: InboundHandler + OutboundHandler {}
