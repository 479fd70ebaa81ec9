use crate::message::Message;

/// What a handler produced besides forwarding, drained by the pipeline
/// after each invocation.
pub(super) enum Emitted {
    Outbound(Message),
    Inbound(Message),
}

/// The view a handler has of its place in the [`Pipeline`] while it is
/// being invoked.
///
/// A context only lives for the duration of one handler call; everything
/// it collects is acted on by the pipeline when the call returns. That
/// keeps handlers free of references back into the chain, so removing a
/// stage can never leave a context pointing at it.
///
/// [`Pipeline`]: crate::Pipeline
pub struct Context<'a> {
    stage: &'a str,
    forwarded: Option<Message>,
    emitted: Vec<Emitted>,
}

impl<'a> Context<'a> {
    pub(super) fn new(stage: &'a str) -> Self {
        Self {
            stage,
            forwarded: None,
            emitted: Vec::new(),
        }
    }

    /// The name of the stage being invoked.
    pub fn stage(&self) -> &str {
        self.stage
    }

    /// Pass a message on to the next stage in the direction it was
    /// travelling. Not calling this swallows the message.
    pub fn forward(&mut self, message: Message) {
        self.forwarded = Some(message);
    }

    /// Emit a message towards the transport. It traverses the outbound
    /// chain like an application send, but no reply is tracked for it.
    pub fn send(&mut self, message: Message) {
        self.emitted.push(Emitted::Outbound(message));
    }

    /// Inject a message towards the application. It traverses the inbound
    /// chain as if it had just been read from the transport.
    pub fn receive(&mut self, message: Message) {
        self.emitted.push(Emitted::Inbound(message));
    }

    pub(super) fn take_forwarded(&mut self) -> Option<Message> {
        self.forwarded.take()
    }

    pub(super) fn into_emitted(self) -> Vec<Emitted> {
        self.emitted
    }
}
