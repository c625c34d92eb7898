//! peerlink client core
//!
//! Drives one multi-channel peer connection per server endpoint: connect
//! token in, signaling handshake, data-channel readiness, then payload
//! traffic with continuous RTT and clock synchronization over the system
//! channel. The concrete signaling and peer-connection transports are
//! supplied by the embedder through the [`signaling::SignalingTransport`],
//! [`peer::PeerConnection`] and [`socket::Connector`] interfaces.

pub mod channel;
pub mod config;
pub mod message;
pub mod peer;
pub mod pool;
pub mod session;
pub mod signal;
pub mod signaling;
pub mod socket;
pub mod stats;
pub mod time;

pub use channel::{Channel, ChannelMode};
pub use config::SocketConfig;
pub use message::Message;
pub use peer::{DataChannelId, DataChannelInit, IceCandidate, PeerConnection, PeerEvent,
    SessionDescription};
pub use pool::Pool;
pub use session::{ConnectResult, Session, SessionState};
pub use signal::{Connection, OnceListener, Signal};
pub use signaling::{ServerFrame, SignalingEvent, SignalingTransport};
pub use socket::{ClientError, Connector, NoopListener, Socket, SocketListener};
pub use stats::{ChannelStatistic, Statistic};
