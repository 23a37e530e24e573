//! Packets exchanged between applications.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::VirtualTime;

/// Opaque packet contents.
///
/// Only `Packet::size` matters to the channel; the contents are carried for
/// applications and tests that want to inspect it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    #[default]
    Empty,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Payload::Text(s) if s.chars().count() > 32 => {
                let head: String = s.chars().take(32).collect();
                write!(f, "Text(\"{}…\")", head)
            }
            Payload::Text(s) => write!(f, "Text({:?})", s),
            Payload::Empty => f.write_str("Empty"),
        }
    }
}

/// A sized packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sender-assigned sequence number.
    pub seq: u64,
    /// Size on the wire in bytes.
    pub size: u32,
    /// Time the original sender handed the packet to the network.
    pub sent_at: VirtualTime,
    pub data: Payload,
}

impl Packet {
    /// An empty packet of `size` bytes.
    pub fn new(seq: u64, size: u32, sent_at: VirtualTime) -> Self {
        Packet {
            seq,
            size,
            sent_at,
            data: Payload::Empty,
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}B sent {} {}", self.seq, self.size, self.sent_at, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_display_truncates_long_text() {
        let p = Payload::Text("x".repeat(40));
        assert_eq!(p.to_string(), format!("Text(\"{}…\")", "x".repeat(32)));
        assert_eq!(Payload::Text("hi".into()).to_string(), "Text(\"hi\")");
    }

    #[test]
    fn test_packet_builder() {
        let p = Packet::new(4, 512, VirtualTime::from_secs(1)).with_data(Payload::Bytes(vec![1, 2]));
        assert_eq!(p.size, 512);
        assert_eq!(p.data, Payload::Bytes(vec![1, 2]));
    }
}
