//! Built-in applications modelled on the usual traffic generators: a
//! periodic sender, a counting sink and an echo server.

pub mod echo;
pub mod sender;
pub mod sink;

pub use echo::EchoServer;
pub use sender::PeriodicSender;
pub use sink::PacketSink;
