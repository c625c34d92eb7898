//! peerlink - client-side multi-channel real-time transport
//!
//! High-level re-exports over the protocol and client crates.

pub use peerlink_client as client;
pub use peerlink_protocol as protocol;

// Re-export commonly used types
pub use client::{ChannelMode, ConnectResult, Message, Session, Socket, SocketListener};
pub use protocol::{ConnectToken, SampleStats};
