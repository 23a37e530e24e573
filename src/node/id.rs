//! Identifiers for nodes, installed applications and their addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a simulated node.
///
/// Newtype around `u64` so node ids cannot be confused with event ids or
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Identifier of an application installed on a [`Network`](super::Network).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppId(u64);

impl AppId {
    #[inline]
    pub fn new(id: u64) -> Self {
        AppId(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// A node plus port: where an application receives packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub node: NodeId,
    pub port: u16,
}

impl Address {
    pub fn new(node: NodeId, port: u16) -> Self {
        Address { node, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(NodeId::new(3).to_string(), "N3");
        assert_eq!(AppId::new(0).to_string(), "A0");
        assert_eq!(Address::new(NodeId::new(1), 9).to_string(), "N1:9");
    }

    #[test]
    fn test_address_ordering_is_node_then_port() {
        let a = Address::new(NodeId::new(0), 100);
        let b = Address::new(NodeId::new(1), 1);
        let c = Address::new(NodeId::new(1), 2);
        assert!(a < b && b < c);
    }
}
