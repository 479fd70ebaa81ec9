use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::org_freedesktop_dbus;
use crate::pipeline::Pipeline;
use crate::sasl::{AuthMechanism, Handshake};
use crate::transport::{Address, Transport};
use crate::value::Value;

use super::correlation::Correlation;
use super::event::EventDispatcher;
use super::io::{authenticate, IoLoop, OutboundEntry};
use super::{health, reconnect};
use super::{Config, ConnectionEvent, ConnectionState, ListenerId};

/// Queue depth between the application stage and the I/O loop, each way.
const QUEUE_DEPTH: usize = 256;

/// The per-session moving parts, replaced on every (re)connect.
struct Session {
    outbound_tx: mpsc::Sender<OutboundEntry>,
    io_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

pub(super) struct Inner {
    pub(super) config: Config,
    address: Address,
    mechanisms: Option<Vec<AuthMechanism>>,
    pipeline: Pipeline,
    pub(super) correlation: Arc<Correlation>,
    state_tx: watch::Sender<ConnectionState>,
    events: EventDispatcher,
    session: Mutex<Option<Session>>,
    /// Serializes connect attempts; concurrent callers share the outcome.
    connect_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    unique_name: Mutex<Option<String>>,
    server_guid: Mutex<Option<String>>,
}

impl Inner {
    pub(super) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(super) fn transition(&self, to: ConnectionState) {
        let mut from = to;

        self.state_tx.send_if_modified(|state| {
            from = *state;

            if from == to {
                return false;
            }

            *state = to;
            true
        });

        if from != to {
            tracing::debug!(%from, %to, "connection state changed");
            self.events.emit(ConnectionEvent::StateChanged { from, to });
        }
    }

    /// Establish a session: connect, authenticate, spawn the two stages,
    /// say Hello.
    pub(super) async fn establish(self: &Arc<Self>) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if self.is_closed() {
            return Err(Error::new(ErrorKind::Disconnected));
        }

        if self.state().sendable() {
            return Ok(());
        }

        // A reconnect goes RECONNECTING -> CONNECTED | FAILED without
        // re-announcing the intermediate connect states.
        let reconnecting = self.state() == ConnectionState::Reconnecting;

        if !reconnecting {
            self.transition(ConnectionState::Connecting);
        }

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.establish_inner(reconnecting),
        );

        match connect.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.teardown(ConnectionState::Failed);
                Err(error)
            }
            Err(_) => {
                self.teardown(ConnectionState::Failed);
                Err(Error::new(ErrorKind::ConnectTimedOut))
            }
        }
    }

    async fn establish_inner(self: &Arc<Self>, reconnecting: bool) -> Result<()> {
        let transport = Transport::connect(&self.address).await?;

        if !reconnecting {
            self.transition(ConnectionState::Authenticating);
        }

        let handshake = Handshake::new(
            super::builder::build_mechanisms(self.mechanisms.as_deref(), &transport),
            transport.supports_fd_passing(),
        );

        let (negotiated, carry) = authenticate(
            &transport,
            handshake,
            self.config.read_timeout,
            self.config.write_timeout,
        )
        .await?;

        *self.server_guid.lock().expect("guid poisoned") = Some(negotiated.guid.clone());
        self.events.emit(ConnectionEvent::Authenticated {
            guid: negotiated.guid.clone(),
        });

        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(QUEUE_DEPTH);

        let io = IoLoop::new(
            transport,
            carry,
            negotiated.fd_passing,
            outbound_rx,
            dispatch_tx,
            self.correlation.clone(),
            self.config.max_message_bytes,
        );

        let weak = Arc::downgrade(self);
        let io_task = tokio::spawn(async move {
            if let Err(error) = io.run().await {
                if let Some(inner) = weak.upgrade() {
                    inner.on_session_error(error);
                }
            }
        });

        let dispatch_task = tokio::spawn(dispatch(Arc::downgrade(self), dispatch_rx));

        let previous = self.session.lock().expect("session poisoned").replace(Session {
            outbound_tx,
            io_task,
            dispatch_task,
        });

        if let Some(previous) = previous {
            previous.io_task.abort();
            previous.dispatch_task.abort();
        }

        self.transition(ConnectionState::Connected);
        self.flush_pipeline(self.pipeline.propagate_connection_active())
            .await;

        // The bus ignores everything until it has seen Hello; the reply
        // carries our unique name.
        let reply = self
            .send_request_with_timeout(
                org_freedesktop_dbus::hello(),
                self.config.method_call_timeout,
            )
            .await?;

        if let Some(Value::String(name)) = reply.body().first() {
            *self.unique_name.lock().expect("name poisoned") = Some(name.clone());
        }

        Ok(())
    }

    /// Tear the current session down, failing all pending calls, and move
    /// to `to`.
    pub(super) fn teardown(&self, to: ConnectionState) {
        let was_active = self.state().sendable();

        if let Some(session) = self.session.lock().expect("session poisoned").take() {
            session.io_task.abort();
            session.dispatch_task.abort();
        }

        self.correlation.disconnect_all();

        if was_active {
            // No transport anymore; whatever handlers emit here is gone.
            let dropped = self.pipeline.propagate_connection_inactive();

            if !dropped.is_empty() {
                tracing::debug!(count = dropped.len(), "messages dropped at teardown");
            }
        }

        self.transition(to);
    }

    /// The I/O loop died underneath an established session.
    pub(super) fn on_session_error(&self, error: Error) {
        if self.is_closed() {
            return;
        }

        tracing::warn!(%error, "connection transport failed");
        self.pipeline.propagate_inbound_failure(&error);
        self.events.emit(ConnectionEvent::TransportError {
            error: Arc::new(error),
        });
        self.teardown(ConnectionState::Failed);
    }

    /// The health monitor gave up on the session.
    pub(super) fn fail_session(&self, error: Error) {
        self.on_session_error(error);
    }

    fn assign_serial(&self, message: Message) -> Message {
        match message.serial() {
            Some(..) => message,
            None => message.with_serial(self.correlation.next_serial()),
        }
    }

    async fn enqueue(&self, entry: OutboundEntry) -> Result<()> {
        let outbound_tx = {
            let session = self.session.lock().expect("session poisoned");

            match &*session {
                Some(session) => session.outbound_tx.clone(),
                None => return Err(Error::new(ErrorKind::NotConnected)),
            }
        };

        outbound_tx
            .send(entry)
            .await
            .map_err(|_| Error::new(ErrorKind::Disconnected))
    }

    /// Send pipeline-emitted messages without tracking completion.
    async fn flush_pipeline(&self, messages: Vec<Message>) {
        for message in messages {
            let message = self.assign_serial(message);

            let entry = OutboundEntry {
                message,
                done: None,
            };

            if self.enqueue(entry).await.is_err() {
                break;
            }
        }
    }

    pub(super) async fn send(&self, message: Message) -> Result<()> {
        if !self.state().sendable() {
            return Err(Error::new(ErrorKind::NotConnected));
        }

        let message = self.assign_serial(message);

        let mut acks = Vec::new();

        for message in self.pipeline.propagate_outbound(message) {
            let message = self.assign_serial(message);
            let (tx, rx) = oneshot::channel();

            self.enqueue(OutboundEntry {
                message,
                done: Some(tx),
            })
            .await?;

            acks.push(rx);
        }

        for ack in acks {
            ack.await
                .map_err(|_| Error::new(ErrorKind::Disconnected))??;
        }

        Ok(())
    }

    pub(super) async fn send_request_with_timeout(
        self: &Arc<Self>,
        message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        if !self.state().sendable() {
            return Err(Error::new(ErrorKind::NotConnected));
        }

        if !message.reply_expected() {
            return Err(Error::new(ErrorKind::NoReplyExpected));
        }

        let permit = self.correlation.reserve().await?;
        let message = self.assign_serial(message);

        let Some(serial) = message.serial() else {
            return Err(Error::new(ErrorKind::MissingSerial));
        };

        // Register before anything reaches the wire, so a fast peer cannot
        // answer an unregistered call; the guard also covers cancellation.
        let mut reply_rx = self.correlation.register(serial);

        let _guard = PendingGuard {
            correlation: self.correlation.clone(),
            serial,
            _permit: permit,
        };

        let (ack_tx, mut ack_rx) = oneshot::channel();
        let mut ack_tx = Some(ack_tx);

        for message in self.pipeline.propagate_outbound(message) {
            let message = self.assign_serial(message);

            // NB: only the request itself carries the flush ack.
            let done = match message.serial() {
                Some(s) if s == serial => ack_tx.take(),
                _ => None,
            };

            self.enqueue(OutboundEntry { message, done }).await?;
        }

        // Armed only when the request actually reached the writer; a
        // handler may have swallowed it, in which case only the deadline
        // or a disconnect can resolve the call.
        let mut ack_armed = ack_tx.is_none();

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    return Err(Error::new(ErrorKind::MethodTimedOut));
                }
                ack = &mut ack_rx, if ack_armed => {
                    ack_armed = false;

                    // A write failure fails the call right away; a dropped
                    // sender means the session died and the reply channel
                    // will resolve.
                    if let Ok(Err(error)) = ack {
                        return Err(error);
                    }
                }
                reply = &mut reply_rx => {
                    return reply.map_err(|_| Error::new(ErrorKind::Disconnected))?;
                }
            }
        }
    }

    pub(super) async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _guard = self.connect_lock.lock().await;
        self.teardown(ConnectionState::Disconnected);
    }
}

/// A registered pending call; dropping it removes the registry entry,
/// which is how cancellation and timeouts free their serial slot.
struct PendingGuard {
    correlation: Arc<Correlation>,
    serial: NonZeroU32,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.correlation.remove(self.serial);
    }
}

/// The application stage: runs the inbound pipeline, including user
/// handlers which are free to block, and feeds whatever they emit back to
/// the writer.
async fn dispatch(inner: Weak<Inner>, mut dispatch_rx: mpsc::Receiver<Message>) {
    while let Some(message) = dispatch_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let wire = inner.pipeline.propagate_inbound(message);
        inner.flush_pipeline(wire).await;
    }
}

/// An asynchronous D-Bus client connection.
///
/// A `Connection` owns serial allocation, reply correlation, the handler
/// [`Pipeline`], optional health checking and automatic reconnection.
/// Cloning is cheap and clones share the connection.
///
/// # Examples
///
/// ```no_run
/// use busline::{Connection, org_freedesktop_dbus};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> busline::Result<()> {
/// let c = Connection::session_bus().await?;
///
/// let reply = c.send_request(org_freedesktop_dbus::get_machine_id()).await?;
/// println!("machine: {:?}", reply.body().first());
///
/// c.close().await;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub(super) fn new(
        config: Config,
        address: Address,
        mechanisms: Option<Vec<AuthMechanism>>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let max_in_flight = config.max_in_flight;

        let inner = Arc::new(Inner {
            config,
            address,
            mechanisms,
            pipeline: Pipeline::new(),
            correlation: Arc::new(Correlation::new(max_in_flight)),
            state_tx,
            events: EventDispatcher::new(),
            session: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            unique_name: Mutex::new(None),
            server_guid: Mutex::new(None),
        });

        if inner.config.health_check_enabled {
            tokio::spawn(health::monitor(Arc::downgrade(&inner)));
        }

        if inner.config.auto_reconnect_enabled {
            tokio::spawn(reconnect::supervise(Arc::downgrade(&inner), state_rx));
        }

        Self { inner }
    }

    /// Connect to the session bus with the default configuration.
    pub async fn session_bus() -> Result<Self> {
        let connection = super::ConnectionBuilder::new().session_bus().build()?;
        connection.connect().await?;
        Ok(connection)
    }

    /// Connect to the system bus with the default configuration.
    pub async fn system_bus() -> Result<Self> {
        let connection = super::ConnectionBuilder::new().system_bus().build()?;
        connection.connect().await?;
        Ok(connection)
    }

    /// Establish the connection.
    ///
    /// Transitions through CONNECTING and AUTHENTICATING into CONNECTED.
    /// Concurrent callers share one attempt; calling on an established
    /// connection does nothing.
    pub async fn connect(&self) -> Result<()> {
        self.inner.establish().await
    }

    /// Send a message without expecting any reply.
    ///
    /// Completes once the bytes are handed to the operating system; it
    /// does not wait for the peer to react. A serial is assigned when the
    /// message has none.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.inner.send(message).await
    }

    /// Send a method call and wait for its reply.
    ///
    /// Completes with the method return, fails with [`Remote`] when the
    /// peer answers with an error, with [`MethodTimedOut`] after the
    /// configured deadline, or with [`Disconnected`] when the connection
    /// goes away first. Dropping the future cancels the pending reply.
    ///
    /// [`Remote`]: crate::ErrorCategory::Remote
    /// [`MethodTimedOut`]: crate::ErrorCategory::MethodTimedOut
    /// [`Disconnected`]: crate::ErrorCategory::Disconnected
    pub async fn send_request(&self, message: Message) -> Result<Message> {
        self.inner
            .send_request_with_timeout(message, self.inner.config.method_call_timeout)
            .await
    }

    /// Like [`send_request`], with an explicit reply deadline.
    ///
    /// [`send_request`]: Self::send_request
    pub async fn send_request_with_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Message> {
        self.inner.send_request_with_timeout(message, timeout).await
    }

    /// Allocate the next message serial, for builders that want it
    /// explicitly.
    pub fn next_serial(&self) -> NonZeroU32 {
        self.inner.correlation.next_serial()
    }

    /// The handler pipeline of this connection.
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// The unique name (`:x.y`) the bus assigned, once connected.
    pub fn unique_name(&self) -> Option<String> {
        self.inner
            .unique_name
            .lock()
            .expect("name poisoned")
            .clone()
    }

    /// The GUID the server sent during authentication, once connected.
    pub fn server_guid(&self) -> Option<String> {
        self.inner
            .server_guid
            .lock()
            .expect("guid poisoned")
            .clone()
    }

    /// Register an event listener.
    ///
    /// Listeners run on a dedicated task; one panicking or blocking does
    /// not impair delivery to the others, nor the connection itself.
    pub fn add_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.add(listener)
    }

    /// Remove a previously registered event listener.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove(id)
    }

    /// Close the connection.
    ///
    /// Idempotent; all pending requests fail with [`Disconnected`] and no
    /// reconnection is attempted afterwards.
    ///
    /// [`Disconnected`]: crate::ErrorCategory::Disconnected
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// The number of calls currently awaiting replies.
    #[cfg(test)]
    pub(crate) fn inner_in_flight(&self) -> usize {
        self.inner.correlation.in_flight()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("unique_name", &self.unique_name())
            .finish_non_exhaustive()
    }
}
