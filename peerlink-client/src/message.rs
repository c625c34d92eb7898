//! Message value type
//!
//! One pooled value type serves both directions: an outgoing message is
//! written through its payload cursor and packed for the wire, an incoming
//! message is the same value loaded from a received frame. Incoming
//! messages handed to the listener are reclaimed by the pool after the
//! callback returns, so user code must copy out anything it keeps.

use peerlink_protocol::payload::Payload;

/// Default payload capacity for fresh messages.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 1024;

/// A pooled, payload-backed message.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Payload,
}

impl Default for Message {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_CAPACITY)
    }
}

impl Message {
    /// Create a message with a payload of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Message {
            payload: Payload::new(capacity),
        }
    }

    /// A message loaded from a received frame.
    pub fn incoming(frame: &[u8]) -> Self {
        let mut message = Self::new(frame.len());
        message.load(frame);
        message
    }

    /// Rewind for a fresh encode of up to `capacity` bytes.
    pub fn reset(&mut self, capacity: usize) {
        self.payload.reset(capacity);
    }

    /// Load a received frame for decoding.
    pub fn load(&mut self, frame: &[u8]) {
        self.payload.load(frame);
    }

    /// The cursor over the message bytes.
    pub fn payload(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Encoded bytes `[0, position)`.
    pub fn pack(&self) -> &[u8] {
        self.payload.pack()
    }

    /// Length of the readable extent.
    pub fn len(&self) -> usize {
        self.payload.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_roundtrip() {
        let mut message = Message::new(16);
        message.payload().write_u32(0xAABB_CCDD).unwrap();
        assert_eq!(message.pack(), &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_incoming_reads_frame() {
        let mut message = Message::incoming(&[1, 0, 2, 0]);
        assert_eq!(message.len(), 4);
        assert_eq!(message.payload().read_u16().unwrap(), 1);
        assert_eq!(message.payload().read_u16().unwrap(), 2);
    }

    #[test]
    fn test_reuse_after_reset() {
        let mut message = Message::incoming(&[9; 8]);
        message.reset(4);
        message.payload().write_u8(1).unwrap();
        assert_eq!(message.pack(), &[1]);
    }
}
