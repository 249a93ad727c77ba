/// Window server wire protocol
///
/// This module implements the fixed-format message exchanged with the
/// display server: identifiers, flags, message kinds and the codec.

pub mod types;
pub mod errors;
pub mod kinds;
pub mod message;

pub use types::*;
pub use errors::*;
pub use kinds::*;
pub use message::*;

/// Header bytes: kind, seqid, src, dest, valid, reserved
pub const HEADER_LEN: usize = 32;

/// Payload union bytes
pub const PAYLOAD_LEN: usize = 48;

/// Length of a message without a trailing buffer
pub const FIXED_MESSAGE_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Largest datagram either side will send
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Sequence id meaning "no correlation expected"
pub const SEQ_NONE: u32 = 0;

/// Sequence id predicate matching any message
pub const SEQ_ANY: u32 = 0;
