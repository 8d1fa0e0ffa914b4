use crate::{Error, Result, ipc::codec::MAX_FRAME_LEN};
use core::time::Duration;
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};
use std::{io, os::fd::OwnedFd, os::unix::net::UnixDatagram};

#[cfg(any(target_os = "android", target_os = "linux"))]
const SOCKET_FLAGS: SockFlag = SockFlag::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "android", target_os = "linux")))]
const SOCKET_FLAGS: SockFlag = SockFlag::empty();

/// A connected pair of local sockets for one request/response exchange.
///
/// The pair is `SOCK_SEQPACKET`: every send is delivered as one record, like
/// a datagram, but a receive on one end returns end-of-stream once every
/// descriptor for the other end is closed. That is what lets the parent see
/// a crashed worker instead of blocking forever.
///
/// Both ends are owned; dropping the `Channel` (or an [`Endpoint`]) closes
/// the descriptor on every path, including early returns.
#[derive(Debug)]
pub struct Channel {
    parent: Endpoint,
    child: Endpoint,
}

impl Channel {
    /// Allocates the socket pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelTransport`] if the OS refuses the pair.
    pub fn open() -> Result<Self> {
        let (parent, child) = socketpair(AddressFamily::Unix, SockType::SeqPacket, None, SOCKET_FLAGS)
            .map_err(|errno| Error::ChannelTransport {
                context: format!("socketpair failed: {}", errno.desc()),
            })?;
        Ok(Self {
            parent: Endpoint::from(parent),
            child: Endpoint::from(child),
        })
    }

    /// Splits the channel into `(parent, child)` ends.
    pub fn split(self) -> (Endpoint, Endpoint) {
        (self.parent, self.child)
    }

    /// Keeps the parent end and closes the child end.
    pub fn into_parent(self) -> Endpoint {
        let (parent, _child) = self.split();
        parent
    }

    /// Keeps the child end and closes the parent end.
    pub fn into_child(self) -> Endpoint {
        let (_parent, child) = self.split();
        child
    }
}

/// One end of a [`Channel`].
#[derive(Debug)]
pub struct Endpoint {
    // std's datagram wrapper only issues send/recv on a connected descriptor,
    // which is exactly the seqpacket contract.
    socket: UnixDatagram,
    receive_timeout: Option<Duration>,
}

impl From<OwnedFd> for Endpoint {
    fn from(fd: OwnedFd) -> Self {
        Self {
            socket: UnixDatagram::from(fd),
            receive_timeout: None,
        }
    }
}

impl Endpoint {
    /// Bounds how long [`recv`](Self::recv) may block. `None` and a zero
    /// duration both block indefinitely.
    pub fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.filter(|t| !t.is_zero());
        self.socket
            .set_read_timeout(timeout)
            .map_err(|e| transport("set receive timeout", &e))?;
        self.receive_timeout = timeout;
        Ok(())
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameTooLarge`] if `frame` exceeds [`MAX_FRAME_LEN`].
    /// - [`Error::ChannelTransport`] if the send fails or is short.
    pub fn send(&self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let sent = loop {
            match self.socket.send(frame) {
                Ok(sent) => break sent,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(transport("send", &e)),
            }
        };
        if sent != frame.len() {
            return Err(Error::ChannelTransport {
                context: format!("short send: {sent} of {} bytes", frame.len()),
            });
        }
        Ok(())
    }

    /// Receives one frame, or `None` once the peer has closed its end.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if a receive timeout is set and elapses.
    /// - [`Error::ChannelTransport`] for any other socket failure.
    pub fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0_u8; MAX_FRAME_LEN];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(len) => {
                    buf.truncate(len);
                    return Ok(Some(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(Error::Timeout {
                        millis: self.receive_timeout.unwrap_or_default().as_millis(),
                    });
                }
                Err(e) => return Err(transport("recv", &e)),
            }
        }
    }
}

fn transport(op: &str, err: &io::Error) -> Error {
    Error::ChannelTransport {
        context: format!("{op} failed: {err}"),
    }
}
