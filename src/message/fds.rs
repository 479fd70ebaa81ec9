use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

/// The file descriptor table attached to a [`Message`].
///
/// Body values of type `h` index into this table. Descriptors received
/// with a message are owned by it: a handler claims one with [`take`], and
/// anything left is closed when the last clone of the message is dropped.
///
/// [`Message`]: crate::Message
/// [`take`]: Fds::take
#[derive(Clone, Default)]
pub struct Fds {
    inner: Arc<Mutex<Vec<Option<OwnedFd>>>>,
}

impl Fds {
    /// Construct an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_vec(fds: Vec<OwnedFd>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fds.into_iter().map(Some).collect())),
        }
    }

    /// The number of slots in the table, taken or not.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("fd table poisoned").len()
    }

    /// Test if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a descriptor, returning the index to reference it with in a
    /// [`Value::UnixFd`] body value.
    ///
    /// [`Value::UnixFd`]: crate::Value::UnixFd
    pub fn push(&self, fd: OwnedFd) -> u32 {
        let mut fds = self.inner.lock().expect("fd table poisoned");
        fds.push(Some(fd));
        (fds.len() - 1) as u32
    }

    /// Claim ownership of the descriptor at `index`.
    ///
    /// Returns `None` if the index is out of range or the descriptor was
    /// already taken.
    pub fn take(&self, index: u32) -> Option<OwnedFd> {
        let mut fds = self.inner.lock().expect("fd table poisoned");
        fds.get_mut(index as usize)?.take()
    }

    /// Drain every remaining descriptor in table order, for handing to the
    /// transport on send.
    pub(crate) fn take_all(&self) -> Vec<OwnedFd> {
        let mut fds = self.inner.lock().expect("fd table poisoned");
        fds.iter_mut().filter_map(|fd| fd.take()).collect()
    }
}

impl fmt::Debug for Fds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fds").field("len", &self.len()).finish()
    }
}
