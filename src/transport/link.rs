//! Physical link abstraction.
//!
//! A [`Link`] owns one physical channel and reports what happens on it as
//! a stream of [`LinkEvent`]s.  Every call is non-blocking: `poll_event`
//! returns `None` when nothing is pending and the engine retries on its
//! next tick.
//!
//! Concrete implementations:
//! - WebSocket (message delivery)
//! - BLE GATT write/notify characteristics (message delivery)
//! - Serial device or reader/writer pair (byte stream)
//! - In-memory pair (either mode, tests and loopback)
//!
//! The engine is generic over `Link`, so adding a new channel requires no
//! changes to correlation or dispatch.

use crate::config::TransportConfig;
use crate::error::LinkError;

/// What one receive event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Each `Data` event is exactly one complete envelope.
    Message,
    /// `Data` events are arbitrary chunks of a continuous byte stream.
    ByteStream,
}

/// Something observed on the physical channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The channel is open and can carry frames.
    Ready,
    /// Inbound bytes.
    Data(Vec<u8>),
    /// A non-fatal error signal.  A close usually follows.
    Error(String),
    /// The channel closed, with the reason and code the platform gave.
    Closed { reason: String, code: Option<i32> },
}

impl LinkEvent {
    pub fn closed(reason: impl Into<String>, code: Option<i32>) -> Self {
        Self::Closed {
            reason: reason.into(),
            code,
        }
    }
}

/// Human-readable form of a close signal: `"<reason> (code N)"`.
pub fn close_description(reason: &str, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("{reason} (code {code})"),
        None => reason.to_string(),
    }
}

/// Non-blocking physical channel.
pub trait Link {
    /// How inbound data is delimited.
    fn delivery(&self) -> Delivery;

    /// Short description for logs and generic connection errors.
    fn describe(&self) -> String;

    /// Pick up link-specific settings.  Called once when the transport is
    /// built, before the first `open()`.
    fn configure(&mut self, _config: &TransportConfig) {}

    /// Begin opening the channel.  Readiness is reported later through
    /// `LinkEvent::Ready`.  Fails immediately if the underlying device or
    /// API does not exist.
    fn open(&mut self) -> Result<(), LinkError>;

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Write bytes to the channel.
    fn send(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Close the channel.  Events queued before the close are discarded.
    fn close(&mut self);
}
