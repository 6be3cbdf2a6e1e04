//! Wire format and outbound delivery
//!
//! There is no framing: a connection carries either one of the two reserved
//! 4-byte control markers or an opaque data packet of up to one read buffer.

pub mod forwarder;

pub use forwarder::{ForwardError, Forwarder, TcpForwarder};

/// Probe request marker
pub const PROBE_REQUEST: &[u8] = b"ping";

/// Probe reply marker
pub const PROBE_REPLY: &[u8] = b"pong";

/// Maximum bytes taken from a single inbound read
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Classification of one inbound read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Peer closed without sending anything
    Empty,
    /// Exactly the probe marker
    Probe,
    /// Anything else, routed byte-for-byte
    Data(&'a [u8]),
}

impl<'a> Frame<'a> {
    pub fn classify(bytes: &'a [u8]) -> Self {
        if bytes.is_empty() {
            Frame::Empty
        } else if bytes == PROBE_REQUEST {
            Frame::Probe
        } else {
            Frame::Data(bytes)
        }
    }
}
