//! The handler pipeline between the transport and the application.
//!
//! A pipeline is an ordered chain of named stages between a fixed HEAD
//! nearest the transport and a fixed TAIL nearest the application. Inbound
//! messages traverse head to tail, outbound messages tail to head. A
//! handler can mutate a message by forwarding a changed one, swallow it by
//! not forwarding, or emit new messages in either direction through its
//! [`Context`].
//!
//! The built-in TAIL answers otherwise unhandled method calls that expect
//! a reply with an `org.freedesktop.DBus.Error.Failed` error, and drops
//! everything else with a diagnostic.

#[cfg(test)]
mod tests;

pub use self::context::Context;
mod context;

pub use self::handler::{DuplexHandler, InboundHandler, OutboundHandler};
mod handler;

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::org_freedesktop_dbus::ERROR_FAILED;

use self::context::Emitted;

/// The name of the head sentinel.
const HEAD: &str = "head";

/// The name of the tail sentinel.
const TAIL: &str = "tail";

enum Handler {
    Inbound(Box<dyn InboundHandler>),
    Outbound(Box<dyn OutboundHandler>),
    Duplex(Box<dyn DuplexHandler>),
}

struct Stage {
    name: String,
    // Handlers take &mut self; the chain itself is read-mostly.
    handler: Mutex<Handler>,
}

/// An ordered chain of message handlers.
///
/// The pipeline is cheap to clone and clones share the same chain.
///
/// # Examples
///
/// ```
/// use busline::{Context, InboundHandler, Message, Pipeline};
///
/// struct Logger;
///
/// impl InboundHandler for Logger {
///     fn message_received(&mut self, ctx: &mut Context<'_>, message: Message) {
///         println!("inbound: {message:?}");
///         ctx.forward(message);
///     }
/// }
///
/// let pipeline = Pipeline::new();
/// pipeline.add_last("logger", Logger)?;
/// # Ok::<_, busline::Error>(())
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<RwLock<Vec<Stage>>>,
}

impl Pipeline {
    /// Construct an empty pipeline.
    pub fn new() -> Self {
        Self {
            stages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add an inbound handler closest to the application, just before the
    /// tail.
    pub fn add_last<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: InboundHandler + 'static,
    {
        self.insert(name, Handler::Inbound(Box::new(handler)), false)
    }

    /// Add an inbound handler closest to the transport, just after the
    /// head.
    pub fn add_first<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: InboundHandler + 'static,
    {
        self.insert(name, Handler::Inbound(Box::new(handler)), true)
    }

    /// Add an outbound handler closest to the application.
    pub fn add_last_outbound<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: OutboundHandler + 'static,
    {
        self.insert(name, Handler::Outbound(Box::new(handler)), false)
    }

    /// Add an outbound handler closest to the transport.
    pub fn add_first_outbound<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: OutboundHandler + 'static,
    {
        self.insert(name, Handler::Outbound(Box::new(handler)), true)
    }

    /// Add a duplex handler closest to the application.
    pub fn add_last_duplex<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: DuplexHandler + 'static,
    {
        self.insert(name, Handler::Duplex(Box::new(handler)), false)
    }

    /// Add a duplex handler closest to the transport.
    pub fn add_first_duplex<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: DuplexHandler + 'static,
    {
        self.insert(name, Handler::Duplex(Box::new(handler)), true)
    }

    fn insert(&self, name: &str, handler: Handler, first: bool) -> Result<()> {
        if name == HEAD || name == TAIL {
            return Err(Error::new(ErrorKind::ReservedStage(name.to_owned())));
        }

        let mut stages = self.stages.write().expect("pipeline poisoned");

        if stages.iter().any(|stage| stage.name == name) {
            return Err(Error::new(ErrorKind::DuplicateStage(name.to_owned())));
        }

        let stage = Stage {
            name: name.to_owned(),
            handler: Mutex::new(handler),
        };

        if first {
            stages.insert(0, stage);
        } else {
            stages.push(stage);
        }

        Ok(())
    }

    /// Remove the named stage.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut stages = self.stages.write().expect("pipeline poisoned");

        let Some(index) = stages.iter().position(|stage| stage.name == name) else {
            return Err(Error::new(ErrorKind::UnknownStage(name.to_owned())));
        };

        stages.remove(index);
        Ok(())
    }

    /// The names of the stages between head and tail, in inbound order.
    pub fn stage_names(&self) -> Vec<String> {
        let stages = self.stages.read().expect("pipeline poisoned");
        stages.iter().map(|stage| stage.name.clone()).collect()
    }

    /// Run an inbound message from the head through the chain.
    ///
    /// Returns the outbound messages this produced, in order, ready for
    /// the transport: replies emitted by handlers as well as the tail's
    /// default error reply for an unhandled call expecting one.
    pub fn propagate_inbound(&self, message: Message) -> Vec<Message> {
        self.run(Work::Inbound(message))
    }

    /// Run an outbound message from the tail through the chain.
    ///
    /// Returns the messages that survived to the head, in order: the
    /// message itself unless a handler swallowed or replaced it, plus any
    /// further outbound emissions.
    pub fn propagate_outbound(&self, message: Message) -> Vec<Message> {
        self.run(Work::Outbound(message))
    }

    /// Notify handlers that the connection became active.
    pub fn propagate_connection_active(&self) -> Vec<Message> {
        self.notify(Event::Active)
    }

    /// Notify handlers that the connection became inactive.
    pub fn propagate_connection_inactive(&self) -> Vec<Message> {
        self.notify(Event::Inactive)
    }

    /// Notify handlers of a connection failure.
    pub fn propagate_inbound_failure(&self, error: &Error) -> Vec<Message> {
        self.notify(Event::Failure(error))
    }

    /// Propagate an application defined event to all handlers.
    pub fn propagate_user_event(&self, event: &(dyn Any + Send + Sync)) -> Vec<Message> {
        self.notify(Event::User(event))
    }

    fn run(&self, work: Work) -> Vec<Message> {
        let stages = self.stages.read().expect("pipeline poisoned");
        let mut queue = VecDeque::from([work]);
        drain_queue(&stages, &mut queue)
    }

    fn notify(&self, event: Event<'_>) -> Vec<Message> {
        let stages = self.stages.read().expect("pipeline poisoned");

        let mut queue = VecDeque::new();

        for stage in stages.iter() {
            let mut guard = stage.handler.lock().expect("pipeline poisoned");

            let handler: &mut dyn InboundHandler = match &mut *guard {
                Handler::Inbound(handler) => &mut **handler,
                Handler::Duplex(handler) => &mut **handler,
                Handler::Outbound(..) => continue,
            };

            let mut ctx = Context::new(&stage.name);

            match event {
                Event::Active => handler.connection_active(&mut ctx),
                Event::Inactive => handler.connection_inactive(&mut ctx),
                Event::Failure(error) => handler.failure_caught(&mut ctx, error),
                Event::User(user) => handler.user_event(&mut ctx, user),
            }

            drain(ctx, &mut queue);
        }

        drain_queue(&stages, &mut queue)
    }
}

impl Default for Pipeline {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

enum Work {
    Inbound(Message),
    Outbound(Message),
}

enum Event<'a> {
    Active,
    Inactive,
    Failure(&'a Error),
    User(&'a (dyn Any + Send + Sync)),
}

/// Process queued work until it settles, collecting the messages bound
/// for the transport in order.
fn drain_queue(stages: &[Stage], queue: &mut VecDeque<Work>) -> Vec<Message> {
    let mut wire = Vec::new();

    while let Some(work) = queue.pop_front() {
        match work {
            Work::Inbound(message) => {
                if let Some(message) = walk_inbound(stages, message, queue) {
                    tail_message(message, queue);
                }
            }
            Work::Outbound(message) => {
                if let Some(message) = walk_outbound(stages, message, queue) {
                    wire.push(message);
                }
            }
        }
    }

    wire
}

/// Walk an inbound message head to tail. Returns the message when it
/// survived the whole chain unclaimed.
fn walk_inbound(
    stages: &[Stage],
    message: Message,
    queue: &mut VecDeque<Work>,
) -> Option<Message> {
    let mut current = Some(message);

    for stage in stages {
        let message = current.take()?;

        let mut guard = stage.handler.lock().expect("pipeline poisoned");

        let handler: &mut dyn InboundHandler = match &mut *guard {
            Handler::Inbound(handler) => &mut **handler,
            Handler::Duplex(handler) => &mut **handler,
            Handler::Outbound(..) => {
                current = Some(message);
                continue;
            }
        };

        let mut ctx = Context::new(&stage.name);
        handler.message_received(&mut ctx, message);
        current = ctx.take_forwarded();
        drain(ctx, queue);
    }

    current
}

/// Walk an outbound message tail to head. Returns the message when it
/// survived the whole chain.
fn walk_outbound(
    stages: &[Stage],
    message: Message,
    queue: &mut VecDeque<Work>,
) -> Option<Message> {
    let mut current = Some(message);

    for stage in stages.iter().rev() {
        let message = current.take()?;

        let mut guard = stage.handler.lock().expect("pipeline poisoned");

        let handler: &mut dyn OutboundHandler = match &mut *guard {
            Handler::Outbound(handler) => &mut **handler,
            Handler::Duplex(handler) => &mut **handler,
            Handler::Inbound(..) => {
                current = Some(message);
                continue;
            }
        };

        let mut ctx = Context::new(&stage.name);
        handler.write(&mut ctx, message);
        current = ctx.take_forwarded();
        drain(ctx, queue);
    }

    current
}

/// The built-in tail behavior for messages nothing claimed.
fn tail_message(message: Message, queue: &mut VecDeque<Work>) {
    if message.reply_expected() {
        // Unclaimed FDs are closed when `message` drops here.
        if let Some(error) = message.error(ERROR_FAILED, "no handler for method call") {
            queue.push_back(Work::Outbound(error));
            return;
        }
    }

    tracing::debug!(?message, "dropping unhandled inbound message");
}

fn drain(ctx: Context<'_>, queue: &mut VecDeque<Work>) {
    for emitted in ctx.into_emitted() {
        match emitted {
            Emitted::Outbound(message) => queue.push_back(Work::Outbound(message)),
            Emitted::Inbound(message) => queue.push_back(Work::Inbound(message)),
        }
    }
}
