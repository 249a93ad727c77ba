//! Protocol decoding errors

use std::fmt;

/// A datagram that could not be decoded into a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than a fixed-size message
    ShortMessage { len: usize },
    /// Kind code not known to this client
    UnknownKind(u32),
    /// Trailing buffer length disagrees with the datagram length
    BadLength { declared: usize, available: usize },
    /// Outbound trailing buffer does not fit in one datagram
    TooLarge { len: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ShortMessage { len } => {
                write!(f, "short message: {} bytes", len)
            }
            ProtocolError::UnknownKind(kind) => write!(f, "unknown message kind 0x{:x}", kind),
            ProtocolError::BadLength {
                declared,
                available,
            } => write!(
                f,
                "trailing buffer declares {} bytes but {} are present",
                declared, available
            ),
            ProtocolError::TooLarge { len } => {
                write!(f, "message too large: {} bytes of trailing data", len)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Result type for codec operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
