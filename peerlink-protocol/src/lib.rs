//! peerlink wire-level core
//!
//! This crate implements the I/O-free core of the peerlink client: the
//! bounds-checked payload cursor, the connect-token decoder, the system
//! channel ping/pong codec, and the RTT and clock-offset estimators that
//! feed on it.

pub mod clock;
pub mod payload;
pub mod rtt;
pub mod sampling;
pub mod system;
pub mod token;

pub use clock::{Clock, SyncLevel};
pub use payload::{Payload, PayloadError};
pub use rtt::{RttCalculator, RttEntry, RTT_RING_SIZE, RTT_SAMPLE_WINDOW};
pub use sampling::{SampleSet, SampleStats};
pub use system::{SystemMessage, SystemMessageError, MAX_SYSTEM_MESSAGE_SIZE};
pub use token::{ConnectToken, TokenError, TOKEN_SIZE};
