use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::Error;

use super::ConnectionState;

/// An observable event on a [`Connection`].
///
/// [`Connection`]: crate::Connection
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionEvent {
    /// The connection moved between lifecycle states.
    StateChanged {
        /// The state left behind.
        from: ConnectionState,
        /// The state entered.
        to: ConnectionState,
    },
    /// Authentication succeeded; the server identified itself.
    Authenticated {
        /// The GUID from the server's `OK` line.
        guid: String,
    },
    /// The transport failed underneath an established connection.
    TransportError {
        /// The failure that brought the session down.
        error: Arc<Error>,
    },
}

/// Identifies a registered event listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Fans connection events out to registered listeners on a dedicated task,
/// so a slow or panicking listener can neither stall the I/O loop nor
/// starve the other listeners.
pub(super) struct EventDispatcher {
    listeners: Arc<Mutex<Vec<(ListenerId, Listener)>>>,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub(super) fn new() -> Self {
        let listeners: Arc<Mutex<Vec<(ListenerId, Listener)>>> = Arc::default();
        let (tx, mut rx) = mpsc::unbounded_channel::<ConnectionEvent>();

        let task_listeners = Arc::downgrade(&listeners);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(listeners) = task_listeners.upgrade() else {
                    break;
                };

                let listeners = listeners.lock().expect("listeners poisoned");

                for (id, listener) in listeners.iter() {
                    if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                        tracing::warn!(?id, "event listener panicked");
                    }
                }
            }
        });

        Self {
            listeners,
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    pub(super) fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.listeners
            .lock()
            .expect("listeners poisoned")
            .push((id, Box::new(listener)));

        id
    }

    pub(super) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("listeners poisoned");
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(super) fn emit(&self, event: ConnectionEvent) {
        tracing::trace!(?event, "connection event");
        let _ = self.tx.send(event);
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
