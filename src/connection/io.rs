use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::Interest;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, ErrorKind, Result};
use crate::frame::{encode_message, FrameDecoder};
use crate::message::Message;
use crate::proto::Endianness;
use crate::sasl::{Handshake, Negotiated, Step, MAX_LINE_LENGTH};
use crate::transport::Transport;

use super::correlation::Correlation;

/// How many frames the writer keeps decoded ahead of the socket.
const WRITE_QUEUE_LIMIT: usize = 64;

/// An application message on its way to the writer.
pub(super) struct OutboundEntry {
    pub(super) message: Message,
    /// Resolved once the frame is fully flushed, or with the failure that
    /// prevented it.
    pub(super) done: Option<oneshot::Sender<Result<()>>>,
}

/// A frame being written, possibly partially.
struct WriteItem {
    bytes: Vec<u8>,
    pos: usize,
    fds: Vec<OwnedFd>,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// The single-task reactor owning the socket of an established session.
///
/// It never runs user code: inbound messages that are not replies are
/// posted to the dispatch queue and handled on the application stage.
pub(super) struct IoLoop {
    transport: Transport,
    decoder: FrameDecoder,
    fd_passing: bool,
    recv_buf: Vec<u8>,
    recv_fds: VecDeque<OwnedFd>,
    write_queue: VecDeque<WriteItem>,
    outbound_rx: mpsc::Receiver<OutboundEntry>,
    dispatch_tx: mpsc::Sender<Message>,
    correlation: Arc<Correlation>,
    max_message_bytes: u32,
}

impl IoLoop {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        transport: Transport,
        carry: Vec<u8>,
        fd_passing: bool,
        outbound_rx: mpsc::Receiver<OutboundEntry>,
        dispatch_tx: mpsc::Sender<Message>,
        correlation: Arc<Correlation>,
        max_message_bytes: u32,
    ) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(max_message_bytes),
            fd_passing,
            recv_buf: carry,
            recv_fds: VecDeque::new(),
            write_queue: VecDeque::new(),
            outbound_rx,
            dispatch_tx,
            correlation,
            max_message_bytes,
        }
    }

    /// Drive the session until the outbound channel closes (an orderly
    /// teardown) or the transport fails.
    pub(super) async fn run(mut self) -> Result<()> {
        enum Wake {
            Outbound(Option<OutboundEntry>),
            Transport(io::Result<tokio::io::Ready>),
        }

        loop {
            let mut interest = Interest::READABLE;

            if !self.write_queue.is_empty() {
                interest = interest | Interest::WRITABLE;
            }

            let accept_outbound = self.write_queue.len() < WRITE_QUEUE_LIMIT;

            let wake = tokio::select! {
                entry = self.outbound_rx.recv(), if accept_outbound => Wake::Outbound(entry),
                ready = self.transport.ready(interest) => Wake::Transport(ready),
            };

            match wake {
                Wake::Outbound(None) => return Ok(()),
                Wake::Outbound(Some(entry)) => {
                    self.enqueue(entry);

                    // Try the write right away; the socket is usually
                    // writable and this saves a readiness round trip.
                    self.flush()?;
                }
                Wake::Transport(ready) => {
                    let ready = ready?;

                    if ready.is_readable() {
                        let messages = self.read()?;
                        self.route(messages).await?;
                    }

                    if ready.is_writable() {
                        self.flush()?;
                    }
                }
            }
        }
    }

    /// Serialize a message onto the write queue.
    ///
    /// Encoding failures are the sender's problem and reported through its
    /// completion; they do not bring the connection down.
    fn enqueue(&mut self, entry: OutboundEntry) {
        let OutboundEntry { message, done } = entry;

        let frame = match encode_message(&message, Endianness::NATIVE, self.max_message_bytes) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(%error, "failed to encode outbound message");
                complete(done, Err(error));
                return;
            }
        };

        if !frame.fds.is_empty() && !self.fd_passing {
            complete(done, Err(Error::new(ErrorKind::FdPassingUnsupported)));
            return;
        }

        self.write_queue.push_back(WriteItem {
            bytes: frame.bytes,
            pos: 0,
            fds: frame.fds,
            done,
        });
    }

    /// Write queued frames until the socket stops accepting bytes.
    fn flush(&mut self) -> Result<()> {
        while let Some(item) = self.write_queue.front_mut() {
            match self
                .transport
                .try_send(&item.bytes[item.pos..], &mut item.fds)
            {
                Ok(n) => {
                    item.pos += n;

                    if item.pos == item.bytes.len() {
                        if let Some(item) = self.write_queue.pop_front() {
                            complete(item.done, Ok(()));
                        }
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    let error = Error::from(error);

                    if let Some(item) = self.write_queue.pop_front() {
                        complete(item.done, Err(Error::new(ErrorKind::Disconnected)));
                    }

                    return Err(error);
                }
            }
        }

        Ok(())
    }

    /// Read until the socket runs dry and decode every complete frame.
    fn read(&mut self) -> Result<Vec<Message>> {
        let mut chunk = [0u8; 8192];

        loop {
            match self
                .transport
                .try_recv(&mut chunk, &mut self.recv_fds, self.fd_passing)
            {
                Ok(0) => {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                }
                Ok(n) => {
                    self.recv_buf.extend_from_slice(&chunk[..n]);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => return Err(error.into()),
            }
        }

        let mut messages = Vec::new();

        while let Some((message, consumed)) =
            self.decoder.decode(&self.recv_buf, &mut self.recv_fds)?
        {
            self.recv_buf.drain(..consumed);
            messages.push(message);
        }

        Ok(messages)
    }

    /// Hand decoded messages onward: replies complete their pending calls,
    /// everything else goes to the dispatch stage in arrival order.
    async fn route(&mut self, messages: Vec<Message>) -> Result<()> {
        for message in messages {
            let Some(message) = self.correlation.complete(message) else {
                continue;
            };

            if self.dispatch_tx.send(message).await.is_err() {
                return Err(Error::new(ErrorKind::Disconnected));
            }
        }

        Ok(())
    }
}

fn complete(done: Option<oneshot::Sender<Result<()>>>, result: Result<()>) {
    match done {
        Some(done) => {
            let _ = done.send(result);
        }
        None => {
            if let Err(error) = result {
                tracing::warn!(%error, "outbound message dropped");
            }
        }
    }
}

/// Drive the SASL handshake over a fresh transport.
///
/// Returns the negotiated parameters and any bytes read beyond the final
/// handshake line, which already belong to the message stream.
pub(super) async fn authenticate(
    transport: &Transport,
    mut handshake: Handshake,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<(Negotiated, Vec<u8>)> {
    let start = handshake.start()?;
    write_all(transport, &start, write_timeout).await?;

    let mut carry = Vec::new();

    loop {
        let line = read_line(transport, &mut carry, read_timeout).await?;

        match handshake.feed(&line)? {
            Step::Send(bytes) => {
                write_all(transport, &bytes, write_timeout).await?;
            }
            Step::Finish(bytes) => {
                write_all(transport, &bytes, write_timeout).await?;

                let negotiated = handshake
                    .negotiated()
                    .ok_or(Error::new(ErrorKind::AuthProtocolViolation))?;

                return Ok((negotiated, carry));
            }
        }
    }
}

/// Read one `\r\n` terminated line, leaving anything beyond it in `carry`.
async fn read_line(
    transport: &Transport,
    carry: &mut Vec<u8>,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        if let Some(n) = carry.iter().position(|&b| b == b'\n') {
            let rest = carry.split_off(n + 1);
            let line = std::mem::replace(carry, rest);
            return Ok(line);
        }

        if carry.len() > MAX_LINE_LENGTH {
            return Err(Error::new(ErrorKind::SaslLineTooLong(carry.len())));
        }

        tokio::select! {
            _ = &mut deadline => {
                return Err(io::Error::from(io::ErrorKind::TimedOut).into());
            }
            ready = transport.ready(Interest::READABLE) => {
                ready?;

                let mut chunk = [0u8; 1024];
                let mut no_fds = VecDeque::new();

                match transport.try_recv(&mut chunk, &mut no_fds, false) {
                    Ok(0) => {
                        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                    }
                    Ok(n) => carry.extend_from_slice(&chunk[..n]),
                    Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }
}

/// Write every byte of `bytes`, within `timeout`.
async fn write_all(transport: &Transport, bytes: &[u8], timeout: Duration) -> Result<()> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut pos = 0;
    let mut no_fds = Vec::new();

    while pos < bytes.len() {
        tokio::select! {
            _ = &mut deadline => {
                return Err(io::Error::from(io::ErrorKind::TimedOut).into());
            }
            ready = transport.ready(Interest::WRITABLE) => {
                ready?;

                match transport.try_send(&bytes[pos..], &mut no_fds) {
                    Ok(n) => pos += n,
                    Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }

    Ok(())
}
