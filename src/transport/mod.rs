//! Pluggable byte-stream endpoints underneath the connection.

pub use self::address::{Address, Endpoint};
mod address;

use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

/// A connected byte stream speaking to a bus or peer.
///
/// Unix sockets can carry `SCM_RIGHTS` file descriptors out-of-band; TCP
/// cannot, which also restricts the authentication mechanisms usable over
/// it.
pub(crate) enum Transport {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Transport {
    /// Connect to the first reachable alternative of `address`.
    pub(crate) async fn connect(address: &Address) -> Result<Self> {
        let mut last_error = None;

        for endpoint in address.alternatives() {
            match Self::connect_endpoint(endpoint).await {
                Ok(transport) => return Ok(transport),
                Err(error) => {
                    tracing::debug!(%endpoint, %error, "endpoint unreachable");
                    last_error = Some(error);
                }
            }
        }

        Err(match last_error {
            Some(error) => error.into(),
            None => Error::new(ErrorKind::InvalidAddress),
        })
    }

    async fn connect_endpoint(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::UnixPath { path, .. } => Ok(Self::Unix(UnixStream::connect(path).await?)),
            #[cfg(target_os = "linux")]
            Endpoint::UnixAbstract { name, .. } => {
                use std::os::linux::net::SocketAddrExt;

                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
                let stream = std::os::unix::net::UnixStream::connect_addr(&addr)?;
                stream.set_nonblocking(true)?;
                Ok(Self::Unix(UnixStream::from_std(stream)?))
            }
            Endpoint::Tcp { host, port, .. } => {
                Ok(Self::Tcp(TcpStream::connect((host.as_str(), *port)).await?))
            }
            #[allow(unreachable_patterns)]
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "endpoint not supported on this platform",
            )),
        }
    }

    /// Whether the transport can pass file descriptors.
    pub(crate) fn supports_fd_passing(&self) -> bool {
        match self {
            #[cfg(unix)]
            Transport::Unix(..) => true,
            Transport::Tcp(..) => false,
        }
    }

    /// Wait until the stream is ready for any of `interest`.
    pub(crate) async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => stream.ready(interest).await,
            Transport::Tcp(stream) => stream.ready(interest).await,
        }
    }

    /// Try to read into `buf`, queueing any file descriptors that arrive
    /// with the data.
    ///
    /// Returns `Ok(0)` on a cleanly closed stream and `WouldBlock` when
    /// the readiness event was stale.
    pub(crate) fn try_recv(
        &self,
        buf: &mut [u8],
        fds: &mut VecDeque<OwnedFd>,
        fd_passing: bool,
    ) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => {
                if !fd_passing {
                    return stream.try_read(buf);
                }

                stream.try_io(Interest::READABLE, || recvmsg_with_fds(stream, buf, fds))
            }
            Transport::Tcp(stream) => stream.try_read(buf),
        }
    }

    /// Try to write `buf`, attaching `fds` to the first byte written when
    /// present.
    ///
    /// Descriptors are only taken off `fds` once something was written.
    pub(crate) fn try_send(&self, buf: &[u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => {
                if fds.is_empty() {
                    return stream.try_write(buf);
                }

                let n = stream.try_io(Interest::WRITABLE, || sendmsg_with_fds(stream, buf, fds))?;

                if n > 0 {
                    fds.clear();
                }

                Ok(n)
            }
            Transport::Tcp(stream) => {
                if !fds.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "file descriptors over TCP",
                    ));
                }

                stream.try_write(buf)
            }
        }
    }
}

#[cfg(unix)]
fn recvmsg_with_fds(
    stream: &UnixStream,
    buf: &mut [u8],
    fds: &mut VecDeque<OwnedFd>,
) -> io::Result<usize> {
    use std::io::IoSliceMut;
    use std::os::fd::{AsRawFd, FromRawFd};

    use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};

    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg = nix::cmsg_space!([std::os::fd::RawFd; 16]);

    let message = recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )
    .map_err(io::Error::from)?;

    for control in message.cmsgs().map_err(io::Error::from)? {
        if let ControlMessageOwned::ScmRights(received) = control {
            for fd in received {
                // SAFETY: SCM_RIGHTS hands us ownership of the descriptor.
                fds.push_back(unsafe { OwnedFd::from_raw_fd(fd) });
            }
        }
    }

    Ok(message.bytes)
}

#[cfg(unix)]
fn sendmsg_with_fds(stream: &UnixStream, buf: &[u8], fds: &[OwnedFd]) -> io::Result<usize> {
    use std::io::IoSlice;
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};

    let raw = fds.iter().map(|fd| fd.as_raw_fd()).collect::<Vec<_>>();
    let iov = [IoSlice::new(buf)];
    let control = [ControlMessage::ScmRights(&raw)];

    sendmsg::<()>(
        stream.as_raw_fd(),
        &iov,
        &control,
        MsgFlags::empty(),
        None,
    )
    .map_err(io::Error::from)
}
