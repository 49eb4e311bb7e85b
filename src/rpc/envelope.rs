//! Fixed 5-byte envelope around every codec payload.
//!
//! Wire format:
//! ```text
//! ┌───────────┬──────────────────┬──────────────────┬─────────────────┐
//! │ Method(1B)│ Correlation (2B) │ Payload len (2B) │ Payload (N B)   │
//! │           │ LE u16           │ LE u16           │                 │
//! └───────────┴──────────────────┴──────────────────┴─────────────────┘
//! ```
//!
//! A correlation id of 0 marks a push/stream frame; any other value ties a
//! response to the request that carried the same id.

use crate::error::CodecError;

/// Envelope header size.
pub const HEADER_SIZE: usize = 5;

/// Correlation id reserved for push/stream frames.
pub const PUSH_ID: u16 = 0;

/// One logical protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub method_id: u8,
    pub correlation_id: u16,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(method_id: u8, correlation_id: u16, payload: Vec<u8>) -> Self {
        Self {
            method_id,
            correlation_id,
            payload,
        }
    }

    /// Whether this is a push/stream frame.
    pub fn is_push(&self) -> bool {
        self.correlation_id == PUSH_ID
    }

    /// Serialize header + payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let len = u16::try_from(self.payload.len())
            .map_err(|_| CodecError::PayloadTooLarge(self.payload.len()))?;
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.push(self.method_id);
        out.extend_from_slice(&self.correlation_id.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse one complete envelope from a delivered unit.
    ///
    /// Returns `None` when the unit is shorter than the header or the
    /// declared payload length exceeds what was delivered.  Bytes past the
    /// declared payload are ignored.
    pub fn parse(unit: &[u8]) -> Option<Self> {
        let total = frame_len(unit)?;
        if unit.len() < total {
            return None;
        }
        Some(Self {
            method_id: unit[0],
            correlation_id: u16::from_le_bytes([unit[1], unit[2]]),
            payload: unit[HEADER_SIZE..total].to_vec(),
        })
    }
}

/// Total frame length (header + payload) declared by a buffered header.
///
/// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    Some(HEADER_SIZE + u16::from_le_bytes([buf[3], buf[4]]) as usize)
}
