//! Client error type
//!
//! Transport failures, server error replies and resource exhaustion all
//! surface through [`ClientError`]. Every variant maps onto an errno value
//! so callers that only care about the classic "null + errno" contract can
//! read [`crate::Client::last_error`].

use crate::protocol::{MessageKind, ProtocolError, WinId};
use nix::errno::Errno;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ClientError {
    /// Socket or shared-memory I/O failure
    Io(io::Error),
    /// The server end of the transport went away
    Disconnected,
    /// No reply arrived for `seqid` before the configured deadline
    Timeout { seqid: u32 },
    /// The server answered `seqid` with an error
    Server { seqid: u32, errno: Errno },
    /// A reply of the wrong kind arrived for a blocking request
    UnexpectedReply {
        expected: MessageKind,
        got: MessageKind,
    },
    /// Undecodable datagram
    Protocol(ProtocolError),
    /// The window is not (or no longer) in the registry
    NoSuchWindow(WinId),
    /// Mapping a canvas segment failed
    Shm(Errno),
    /// No menu item with this id
    NoSuchMenuItem(u8),
    /// The 8-bit menu id counter wrapped
    MenuIdsExhausted,
    /// The client was shut down
    NotConnected,
}

impl ClientError {
    /// errno equivalent of this error
    pub fn errno(&self) -> Errno {
        match self {
            ClientError::Io(e) => e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO),
            ClientError::Disconnected => Errno::ENOTCONN,
            ClientError::Timeout { .. } => Errno::ETIMEDOUT,
            ClientError::Server { errno, .. } => *errno,
            ClientError::UnexpectedReply { .. } => Errno::EPROTO,
            ClientError::Protocol(_) => Errno::EPROTO,
            ClientError::NoSuchWindow(_) => Errno::ENOENT,
            ClientError::Shm(errno) => *errno,
            ClientError::NoSuchMenuItem(_) => Errno::ENOENT,
            ClientError::MenuIdsExhausted => Errno::ENOMEM,
            ClientError::NotConnected => Errno::ENOTCONN,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "transport error: {}", e),
            ClientError::Disconnected => write!(f, "display server disconnected"),
            ClientError::Timeout { seqid } => write!(f, "no reply for request {}", seqid),
            ClientError::Server { seqid, errno } => {
                write!(f, "server rejected request {}: {}", seqid, errno.desc())
            }
            ClientError::UnexpectedReply { expected, got } => {
                write!(f, "expected {} reply, got {}", expected, got)
            }
            ClientError::Protocol(e) => write!(f, "protocol error: {}", e),
            ClientError::NoSuchWindow(id) => write!(f, "no such window {}", id),
            ClientError::Shm(errno) => write!(f, "canvas mapping failed: {}", errno.desc()),
            ClientError::NoSuchMenuItem(id) => write!(f, "no such menu item {}", id),
            ClientError::MenuIdsExhausted => write!(f, "menu item ids exhausted"),
            ClientError::NotConnected => write!(f, "client is shut down"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<nix::Error> for ClientError {
    fn from(e: nix::Error) -> Self {
        ClientError::Shm(e)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
