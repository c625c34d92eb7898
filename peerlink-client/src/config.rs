//! Socket configuration
//!
//! Serde-derived so front-ends can load it from a config file alongside
//! their own settings.

use crate::channel::ChannelMode;
use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::socket::Socket`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Reliability mode of each data channel, in channel-index order.
    pub channels: Vec<ChannelMode>,

    /// Interval between system pings, in milliseconds.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Idle messages kept per pool.
    #[serde(default = "default_pool_capacity")]
    pub message_pool_capacity: usize,

    /// Payload capacity of freshly created messages.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
}

fn default_ping_interval_ms() -> u64 {
    crate::time::PING_INTERVAL.as_millis() as u64
}

fn default_pool_capacity() -> usize {
    crate::pool::DEFAULT_POOL_CAPACITY
}

fn default_message_capacity() -> usize {
    crate::message::DEFAULT_MESSAGE_CAPACITY
}

impl SocketConfig {
    /// A configuration with the given channel modes and default tuning.
    pub fn with_channels(channels: Vec<ChannelMode>) -> Self {
        SocketConfig {
            channels,
            ping_interval_ms: default_ping_interval_ms(),
            message_pool_capacity: default_pool_capacity(),
            message_capacity: default_message_capacity(),
        }
    }

    /// Number of configured data channels (excluding the system channel).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
