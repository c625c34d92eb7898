//! System channel wire format
//!
//! Ping/pong messages are a single header byte followed by packed
//! little-endian integers. The header carries the opcode in the top two
//! bits and the packed field widths (minus one) in the remaining bits:
//!
//! ```text
//! bit  7 6 | 5 4 3     | 2 1 0
//!     opcode seq_bytes-1 time_bytes-1   (time field: PONG only)
//! ```

use crate::payload::{Payload, PayloadError};
use thiserror::Error;

/// Opcode for a ping (bits 7..6 = 0).
const OPCODE_PING: u8 = 0;
/// Opcode for a pong (bits 7..6 = 1).
const OPCODE_PONG: u8 = 1;

/// Largest encoded system message: header + packed sequence + packed time.
pub const MAX_SYSTEM_MESSAGE_SIZE: usize = 1 + 8 + 8;

/// System message codec errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessageError {
    #[error("unknown system opcode {0}")]
    UnknownOpcode(u8),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// A message on the system channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    Ping { sequence: u16 },
    Pong { sequence: u16, server_time: u64 },
}

impl SystemMessage {
    /// Encode into `payload`, which is reset first.
    pub fn encode(&self, payload: &mut Payload) -> Result<(), PayloadError> {
        payload.reset(MAX_SYSTEM_MESSAGE_SIZE);
        match *self {
            SystemMessage::Ping { sequence } => {
                let seq_bytes = Payload::calc_packed_u64_bytes(sequence as u64);
                payload.write_u8(header(OPCODE_PING, seq_bytes, 1))?;
                payload.write_packed_u64(seq_bytes, sequence as u64)?;
            }
            SystemMessage::Pong {
                sequence,
                server_time,
            } => {
                let seq_bytes = Payload::calc_packed_u64_bytes(sequence as u64);
                let time_bytes = Payload::calc_packed_u64_bytes(server_time);
                payload.write_u8(header(OPCODE_PONG, seq_bytes, time_bytes))?;
                payload.write_packed_u64(seq_bytes, sequence as u64)?;
                payload.write_packed_u64(time_bytes, server_time)?;
            }
        }
        Ok(())
    }

    /// Decode one message from raw channel bytes.
    pub fn decode(frame: &[u8]) -> Result<Self, SystemMessageError> {
        let mut payload = Payload::new(frame.len());
        payload.load(frame);

        let head = payload.read_u8()?;
        let opcode = head >> 6;
        let seq_bytes = ((head >> 3) & 0x07) as usize + 1;

        match opcode {
            OPCODE_PING => {
                let sequence = payload.read_packed_u64(seq_bytes)? as u16;
                Ok(SystemMessage::Ping { sequence })
            }
            OPCODE_PONG => {
                let time_bytes = (head & 0x07) as usize + 1;
                let sequence = payload.read_packed_u64(seq_bytes)? as u16;
                let server_time = payload.read_packed_u64(time_bytes)?;
                Ok(SystemMessage::Pong {
                    sequence,
                    server_time,
                })
            }
            other => Err(SystemMessageError::UnknownOpcode(other)),
        }
    }
}

fn header(opcode: u8, seq_bytes: usize, time_bytes: usize) -> u8 {
    (opcode << 6) | (((seq_bytes - 1) as u8) << 3) | ((time_bytes - 1) as u8)
}
