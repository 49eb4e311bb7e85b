//! Envelope recovery from an unstructured byte stream.
//!
//! Serial links deliver arbitrary chunks with no message boundary.  The
//! [`StreamDecoder`] accumulates bytes across receive events and yields
//! complete envelopes, optionally delimited on the wire by a configured
//! prefix and suffix:
//!
//! ```text
//! ┌──────────┬───────────────────────────────┬──────────┐
//! │ prefix   │ envelope (5B header + payload)│ suffix   │
//! │ (0..16B) │                               │ (0..16B) │
//! └──────────┴───────────────────────────────┴──────────┘
//! ```
//!
//! Every transition depends only on the bytes buffered so far, never on
//! how they were chunked, so feeding a stream one byte at a time or all at
//! once yields the same frames.

use log::{debug, warn};

use crate::config::Framing;

use super::envelope::{Envelope, frame_len};

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Scanning for the prefix marker.
    SeekPrefix,
    /// Waiting for the 5-byte header.
    ReadingHeader,
    /// Header seen, waiting for `total` bytes.
    ReadingFrame { total: usize },
    /// Frame extracted, waiting to strip the suffix marker.
    ReadingSuffix,
}

/// Streaming envelope decoder.
pub struct StreamDecoder {
    state: DecoderState,
    buf: Vec<u8>,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    max_buffer: usize,
    suffix_mismatches: u32,
}

impl StreamDecoder {
    pub fn new(framing: &Framing, max_buffer: usize) -> Self {
        Self {
            state: DecoderState::SeekPrefix,
            buf: Vec::new(),
            prefix: framing.prefix.to_vec(),
            suffix: framing.suffix.to_vec(),
            max_buffer,
            suffix_mismatches: 0,
        }
    }

    /// Feed one received chunk; returns every envelope it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Envelope> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match self.state {
                DecoderState::SeekPrefix => {
                    if self.prefix.is_empty() {
                        self.state = DecoderState::ReadingHeader;
                        continue;
                    }
                    let Some(at) = find(&self.buf, &self.prefix) else {
                        self.trim_noise();
                        break;
                    };
                    if at > 0 {
                        debug!("RPC[serial]: discarding {} bytes before prefix", at);
                    }
                    self.buf.drain(..at + self.prefix.len());
                    self.state = DecoderState::ReadingHeader;
                }

                DecoderState::ReadingHeader => match frame_len(&self.buf) {
                    Some(total) => self.state = DecoderState::ReadingFrame { total },
                    None => break,
                },

                DecoderState::ReadingFrame { total } => {
                    if self.buf.len() < total {
                        break;
                    }
                    let raw: Vec<u8> = self.buf.drain(..total).collect();
                    frames.extend(Envelope::parse(&raw));
                    self.state = DecoderState::ReadingSuffix;
                }

                DecoderState::ReadingSuffix => {
                    if !self.suffix.is_empty() {
                        if self.buf.len() < self.suffix.len() {
                            break;
                        }
                        if self.buf.starts_with(&self.suffix) {
                            self.buf.drain(..self.suffix.len());
                        } else {
                            // Keep the bytes: they are either noise before the
                            // next prefix or the start of the next header.
                            self.suffix_mismatches = self.suffix_mismatches.saturating_add(1);
                            warn!("RPC[serial]: frame not followed by configured suffix, resyncing");
                        }
                    }
                    self.state = DecoderState::SeekPrefix;
                }
            }
        }

        frames
    }

    /// Drop buffered noise past the cap, keeping only the tail that could
    /// still be the start of a prefix marker.
    fn trim_noise(&mut self) {
        if self.buf.len() <= self.max_buffer {
            return;
        }
        let keep = self.prefix.len().saturating_sub(1);
        let drop = self.buf.len().saturating_sub(keep);
        if drop == 0 {
            return;
        }
        debug!("RPC[serial]: no prefix in {} buffered bytes, trimming", drop);
        self.buf.drain(..drop);
    }

    /// Discard all buffered bytes (e.g. on disconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::SeekPrefix;
    }

    /// Bytes currently held in the accumulator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Frames whose trailing bytes did not match the configured suffix.
    pub fn suffix_mismatches(&self) -> u32 {
        self.suffix_mismatches
    }
}

/// Wrap an encoded envelope in the configured prefix and suffix.
pub fn wrap(frame: &[u8], framing: &Framing) -> Vec<u8> {
    let mut out = Vec::with_capacity(framing.prefix.len() + frame.len() + framing.suffix.len());
    out.extend_from_slice(&framing.prefix);
    out.extend_from_slice(frame);
    out.extend_from_slice(&framing.suffix);
    out
}

/// Index of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Tests ────────────────────────────────────────────────────
