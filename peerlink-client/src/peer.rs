//! Peer-connection interface
//!
//! The concrete peer-connection library is outside this crate; the session
//! drives it through this trait. Implementations must be able to create
//! named data channels with per-channel reliability options, apply a remote
//! offer, produce a local answer, exchange ICE candidates, and deliver
//! channel lifecycle and payload events through a non-blocking poll.
//!
//! Event delivery is pull-based to match the single-threaded pump loop:
//! implementations queue completions internally and hand them over in
//! arrival order from `poll_event`.

use bytes::Bytes;
use thiserror::Error;

/// Identifier an implementation assigns to one uni-directional data channel.
pub type DataChannelId = u64;

/// Options for creating a data channel, derived from the channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChannelInit {
    /// In-order delivery.
    pub ordered: bool,
    /// Retransmit cap; `None` means unlimited (reliable).
    pub max_retransmits: Option<u16>,
}

/// One side of the SDP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Description type, `offer` or `answer`.
    pub kind: String,
    /// SDP body.
    pub sdp: String,
}

/// One ICE candidate with its media-line association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub mid: String,
    pub candidate: String,
}

/// Completions delivered from the peer-connection layer.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A data channel (local- or peer-created) reached the open state.
    ChannelOpened { id: DataChannelId, label: String },
    /// A complete payload arrived on a channel.
    ChannelData { id: DataChannelId, data: Bytes },
    /// A data channel closed.
    ChannelClosed { id: DataChannelId },
    /// ICE gathered a local candidate to forward over signaling.
    LocalCandidate(IceCandidate),
    /// The connection failed or was closed; the session must tear down.
    ConnectionClosed,
}

/// Peer-connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("data channel creation failed: {0}")]
    ChannelCreation(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("peer connection is closed")]
    Closed,
}

/// Driver interface over the out-of-scope peer-connection library.
pub trait PeerConnection {
    /// Create a named outgoing data channel.
    fn create_data_channel(
        &mut self,
        label: &str,
        init: DataChannelInit,
    ) -> Result<DataChannelId, PeerError>;

    /// Apply the remote description received over signaling.
    fn set_remote_description(&mut self, description: &SessionDescription)
        -> Result<(), PeerError>;

    /// Produce the local answer for the current remote description.
    fn create_answer(&mut self) -> Result<SessionDescription, PeerError>;

    /// Add a remote ICE candidate.
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), PeerError>;

    /// Enqueue a payload on an open channel.
    fn send(&mut self, id: DataChannelId, data: &[u8]) -> Result<(), PeerError>;

    /// Next pending completion, in arrival order.
    fn poll_event(&mut self) -> Option<PeerEvent>;

    /// Close the connection and every channel. Idempotent.
    fn close(&mut self);
}
