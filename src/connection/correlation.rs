use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, MessageKind};
use crate::value::Value;

/// Serial allocation and the pending-reply registry.
///
/// Serials are strictly increasing and skip zero on wraparound. A pending
/// entry is created before its call is written and removed on reply,
/// error, timeout, cancellation or connection loss, whichever comes
/// first.
pub(super) struct Correlation {
    serial: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Message>>>>,
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_in_flight: usize,
}

impl Correlation {
    pub(super) fn new(max_in_flight: usize) -> Self {
        Self {
            serial: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            waiting: AtomicUsize::new(0),
            max_in_flight,
        }
    }

    /// Allocate the next serial.
    pub(super) fn next_serial(&self) -> NonZeroU32 {
        loop {
            let serial = self.serial.fetch_add(1, Ordering::Relaxed);

            if let Some(serial) = NonZeroU32::new(serial) {
                return serial;
            }
        }
    }

    /// Reserve capacity for one in-flight call.
    ///
    /// Waits while the in-flight cap is reached; once as many callers are
    /// waiting as can ever be in flight, gives up with `TooManyInFlight`.
    pub(super) async fn reserve(&self) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.max_in_flight {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::new(ErrorKind::TooManyInFlight));
        }

        let result = self.permits.clone().acquire_owned().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        result.map_err(|_| Error::new(ErrorKind::Disconnected))
    }

    /// Register a pending reply for `serial`.
    pub(super) fn register(&self, serial: NonZeroU32) -> oneshot::Receiver<Result<Message>> {
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .expect("pending registry poisoned")
            .insert(serial.get(), tx);

        rx
    }

    /// Remove a pending entry without completing it, such as when the
    /// write failed, the deadline elapsed or the caller went away.
    pub(super) fn remove(&self, serial: NonZeroU32) {
        self.pending
            .lock()
            .expect("pending registry poisoned")
            .remove(&serial.get());
    }

    /// Route an inbound reply to its pending call.
    ///
    /// Returns the message back when no call is waiting for it, so it can
    /// travel the inbound pipeline as an unmatched message.
    pub(super) fn complete(&self, message: Message) -> Option<Message> {
        let reply_serial = match message.kind() {
            MessageKind::MethodReturn { reply_serial } => *reply_serial,
            MessageKind::Error { reply_serial, .. } => *reply_serial,
            _ => return Some(message),
        };

        let tx = self
            .pending
            .lock()
            .expect("pending registry poisoned")
            .remove(&reply_serial.get())?;

        let result = match message.kind() {
            MessageKind::Error { error_name, .. } => {
                let text = match message.body().first() {
                    Some(Value::String(text)) => Some(text.clone()),
                    _ => None,
                };

                Err(Error::remote(error_name.clone(), text))
            }
            _ => Ok(message),
        };

        // The caller may have timed out and dropped the receiver already.
        let _ = tx.send(result);
        None
    }

    /// Fail every pending call with `Disconnected`.
    pub(super) fn disconnect_all(&self) {
        let pending = std::mem::take(
            &mut *self.pending.lock().expect("pending registry poisoned"),
        );

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::new(ErrorKind::Disconnected)));
        }
    }

    /// The number of calls currently awaiting replies.
    #[cfg(test)]
    pub(super) fn in_flight(&self) -> usize {
        self.pending.lock().expect("pending registry poisoned").len()
    }
}
