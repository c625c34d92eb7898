//! Data channel pairing and lifecycle
//!
//! Each logical channel pairs the client-created outgoing half with the
//! server-created incoming half, which attaches once the peer opens it.
//! The reliability mode is fixed at construction; there is deliberately no
//! setter, so mode immutability is structural.

use crate::peer::{DataChannelId, DataChannelInit, PeerConnection};
use crate::signal::Signal;
use crate::stats::SharedStatistic;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reliability mode of a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Lossy, unordered delivery.
    Unreliable,
    /// Lossy delivery, newest-wins ordering.
    Sequenced,
    /// Lossless, ordered delivery.
    Reliable,
}

impl ChannelMode {
    /// Data channel options implementing this mode.
    pub fn init(&self) -> DataChannelInit {
        match self {
            ChannelMode::Unreliable => DataChannelInit {
                ordered: false,
                max_retransmits: Some(0),
            },
            ChannelMode::Sequenced => DataChannelInit {
                ordered: true,
                max_retransmits: Some(0),
            },
            ChannelMode::Reliable => DataChannelInit {
                ordered: true,
                max_retransmits: None,
            },
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Unreliable => write!(f, "unreliable"),
            ChannelMode::Sequenced => write!(f, "sequenced"),
            ChannelMode::Reliable => write!(f, "reliable"),
        }
    }
}

/// Label of the client-created outgoing half of channel `index`.
pub fn outgoing_label(index: usize) -> String {
    format!("client-channel-{index}")
}

/// Label of the server-created incoming half of channel `index`.
pub fn incoming_label(index: usize) -> String {
    format!("server-channel-{index}")
}

/// Label of the server-created system channel.
pub const SYSTEM_CHANNEL_LABEL: &str = "system";

/// One logical channel: a paired outgoing/incoming data channel.
pub struct Channel {
    index: usize,
    mode: ChannelMode,
    outgoing: DataChannelId,
    incoming: Option<DataChannelId>,
    opened: bool,
    closed: bool,
    statistic: SharedStatistic,

    /// Fires when the outgoing half reaches the open state.
    pub on_opened: Signal<()>,
    /// Fires for every complete payload from the incoming half.
    pub on_data: Signal<Bytes>,
    /// Fires exactly once, on the first close of either half.
    pub on_closed: Signal<()>,
}

impl Channel {
    pub(crate) fn new(
        index: usize,
        mode: ChannelMode,
        outgoing: DataChannelId,
        statistic: SharedStatistic,
    ) -> Self {
        Channel {
            index,
            mode,
            outgoing,
            incoming: None,
            opened: false,
            closed: false,
            statistic,
            on_opened: Signal::new(),
            on_data: Signal::new(),
            on_closed: Signal::new(),
        }
    }

    /// Channel index within the socket configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reliability mode, immutable for the channel lifetime.
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Whether the outgoing half is open and the channel not yet closed.
    pub fn is_open(&self) -> bool {
        self.opened && !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn outgoing_id(&self) -> DataChannelId {
        self.outgoing
    }

    pub(crate) fn incoming_id(&self) -> Option<DataChannelId> {
        self.incoming
    }

    pub(crate) fn attach_incoming(&mut self, id: DataChannelId) {
        self.incoming = Some(id);
    }

    /// Whether `id` is one of this channel's halves.
    pub(crate) fn owns(&self, id: DataChannelId) -> bool {
        self.outgoing == id || self.incoming == Some(id)
    }

    pub(crate) fn handle_opened(&mut self) {
        if !self.opened {
            self.opened = true;
            self.on_opened.emit(&());
        }
    }

    pub(crate) fn handle_data(&mut self, data: Bytes) {
        self.statistic.write().record_received(self.index, data.len());
        self.on_data.emit(&data);
    }

    pub(crate) fn handle_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.on_closed.emit(&());
        }
    }

    /// Enqueue a payload on the outgoing half.
    ///
    /// Returns false once the channel has closed or before it opened; a
    /// rejected send leaves the statistics untouched.
    pub fn send(&mut self, peer: &mut dyn PeerConnection, data: &[u8]) -> bool {
        if self.closed || !self.opened {
            return false;
        }
        if peer.send(self.outgoing, data).is_err() {
            return false;
        }
        self.statistic.write().record_sent(self.index, data.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Statistic;
    use parking_lot::RwLock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn statistic() -> SharedStatistic {
        Arc::new(RwLock::new(Statistic::new(2)))
    }

    #[test]
    fn test_mode_to_init_mapping() {
        assert_eq!(
            ChannelMode::Unreliable.init(),
            DataChannelInit {
                ordered: false,
                max_retransmits: Some(0)
            }
        );
        assert_eq!(
            ChannelMode::Sequenced.init(),
            DataChannelInit {
                ordered: true,
                max_retransmits: Some(0)
            }
        );
        assert_eq!(
            ChannelMode::Reliable.init(),
            DataChannelInit {
                ordered: true,
                max_retransmits: None
            }
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(outgoing_label(0), "client-channel-0");
        assert_eq!(incoming_label(3), "server-channel-3");
    }

    #[test]
    fn test_closed_emits_once() {
        let mut channel = Channel::new(0, ChannelMode::Reliable, 1, statistic());
        let count = Rc::new(RefCell::new(0));
        {
            let count = Rc::clone(&count);
            channel.on_closed.connect(move |_| *count.borrow_mut() += 1);
        }

        channel.handle_closed();
        channel.handle_closed();
        assert_eq!(*count.borrow(), 1);
        assert!(channel.is_closed());
    }

    #[test]
    fn test_data_accumulates_statistics() {
        let stats = statistic();
        let mut channel = Channel::new(1, ChannelMode::Unreliable, 1, Arc::clone(&stats));
        channel.handle_data(Bytes::from_static(b"12345"));
        assert_eq!(stats.read().channel(1).bytes_received, 5);
        assert_eq!(stats.read().channel(1).messages_received, 1);
    }
}
