//! Application layer: nodes, links and the applications installed on them.
//!
//! Everything here runs on top of the kernel. A [`Network`] is used as the
//! world of a [`Simulation`](crate::Simulation); applications never touch
//! each other directly and interact only through packets and timers,
//! which are ordinary events attributed to a node.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`], [`AppId`], [`Address`] |
//! | [`packet`] | [`Packet`], [`Payload`] |
//! | [`channel`] | [`ChannelConfig`], [`Channel`], [`ChannelDecision`] |
//! | [`traits`] | [`Application`] trait, [`AppContext`], [`AppInfo`] |
//! | [`network`] | [`Network`], [`NetworkStats`] |
//! | [`builtin`] | [`PeriodicSender`], [`PacketSink`], [`EchoServer`] |

pub mod builtin;
pub mod channel;
pub mod id;
pub mod network;
pub mod packet;
pub mod traits;

pub use builtin::{EchoServer, PacketSink, PeriodicSender};
pub use channel::{Channel, ChannelConfig, ChannelDecision};
pub use id::{Address, AppId, NodeId};
pub use network::{Network, NetworkStats};
pub use packet::{Packet, Payload};
pub use traits::{AppContext, AppInfo, Application};

#[cfg(test)]
mod tests;
