//! Connection layer
//!
//! This module carries datagrams to and from the display server over a
//! connected local datagram socket, and queues inbound messages for the
//! sequence-aware dequeue in [`queue`].

mod queue;

pub use queue::Connection;

use std::io;
use std::os::fd::AsFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Raw datagram transport to the server
pub trait Transport: Send + Sync {
    /// Send one datagram
    fn send(&self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram without blocking. `Ok(None)` when nothing is
    /// pending.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Block until a datagram may be readable or `timeout` passes
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;
}

static BIND_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Unix datagram socket transport
pub struct UnixTransport {
    socket: UnixDatagram,
    /// Path our end is bound to, removed on drop
    bound_path: Option<PathBuf>,
}

impl UnixTransport {
    /// Bind a private reply address and connect to the server at `path`
    pub fn connect<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let local = std::env::temp_dir().join(format!(
            "wsclient-{}-{}.sock",
            std::process::id(),
            BIND_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        // Remove a stale socket file left by a crashed process with our pid
        let _ = std::fs::remove_file(&local);
        let socket = UnixDatagram::bind(&local)?;
        let transport = UnixTransport {
            socket,
            bound_path: Some(local),
        };
        transport.socket.connect(path.as_ref())?;
        transport.socket.set_nonblocking(true)?;
        log::info!("Connected to display server at {}", path.as_ref().display());
        Ok(transport)
    }

    /// Wrap an already connected socket (one end of a socket pair)
    pub fn from_socket(socket: UnixDatagram) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(UnixTransport {
            socket,
            bound_path: None,
        })
    }

    fn wait_for(&self, flags: PollFlags, timeout: Duration) -> io::Result<bool> {
        let ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(self.socket.as_fd(), flags)];
        match poll(&mut fds, PollTimeout::from(ms)) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl Transport for UnixTransport {
    fn send(&self, datagram: &[u8]) -> io::Result<()> {
        loop {
            match self.socket.send(datagram) {
                Ok(n) if n == datagram.len() => return Ok(()),
                Ok(n) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("short datagram write: {} of {} bytes", n, datagram.len()),
                    ))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Server queue is full; wait for room
                    self.wait_for(PollFlags::POLLOUT, Duration::from_millis(100))?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.socket.recv(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "display server closed the connection",
                    ))
                }
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.wait_for(PollFlags::POLLIN, timeout)
    }
}

impl Drop for UnixTransport {
    fn drop(&mut self) {
        if let Some(path) = self.bound_path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_send_and_receive() {
        let (a, b) = UnixDatagram::pair().unwrap();
        let transport = UnixTransport::from_socket(a).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(transport.try_recv(&mut buf).unwrap(), None);

        b.send(b"hello").unwrap();
        assert!(transport.wait_readable(Duration::from_secs(1)).unwrap());
        assert_eq!(transport.try_recv(&mut buf).unwrap(), Some(5));
        assert_eq!(&buf[..5], b"hello");

        transport.send(b"reply").unwrap();
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"reply");
    }

    #[test]
    fn test_wait_readable_times_out() {
        let (a, _b) = UnixDatagram::pair().unwrap();
        let transport = UnixTransport::from_socket(a).unwrap();
        assert!(!transport.wait_readable(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_connect_to_missing_server_fails() {
        let missing = std::env::temp_dir().join("wsclient-no-such-server.sock");
        assert!(UnixTransport::connect(&missing).is_err());
    }
}
