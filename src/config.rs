//! Transport configuration parameters
//!
//! All tunable parameters for one RPC transport instance.  Every field has a
//! default, so a partial JSON document only overrides what it names.

use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Maximum length of a prefix or suffix marker.
pub const MAX_MARKER_LEN: usize = 16;

/// Marker bytes wrapped around a frame on a byte-stream link.
pub type Marker = heapless::Vec<u8, MAX_MARKER_LEN>;

/// Byte-stream delimiters.  Both empty by default (no delimiters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framing {
    pub prefix: Marker,
    pub suffix: Marker,
}

impl Framing {
    /// Build markers from Latin-1 strings (one byte per char), the way peers
    /// usually configure them, e.g. `Framing::from_markers("\x02", "\r\n")`.
    pub fn from_markers(prefix: &str, suffix: &str) -> anyhow::Result<Self> {
        Ok(Self {
            prefix: latin1(prefix).context("prefix marker")?,
            suffix: latin1(suffix).context("suffix marker")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }
}

fn latin1(s: &str) -> anyhow::Result<Marker> {
    let mut out = Marker::new();
    for c in s.chars() {
        let b = u8::try_from(u32::from(c))
            .map_err(|_| anyhow::anyhow!("character {c:?} is outside Latin-1"))?;
        if out.push(b).is_err() {
            bail!("marker longer than {MAX_MARKER_LEN} bytes");
        }
    }
    Ok(out)
}

/// Core transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    // --- Calls ---
    /// Per-call timeout when neither the caller nor the method supplies one
    pub default_timeout_ms: u64,

    // --- Connect ---
    /// Upper bound on waiting for the ready signal
    pub connect_timeout_ms: u64,
    /// Grace window after an error signal for a close reason to arrive
    pub error_grace_ms: u64,

    // --- Receive path ---
    /// Receive loop idle tick
    pub poll_interval_ms: u64,
    /// Accumulator cap while no prefix marker has been found
    pub max_stream_buffer: usize,

    // --- Byte stream ---
    pub framing: Framing,
    /// Line rate for serial devices opened by path
    pub baud_rate: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 2000,
            connect_timeout_ms: 10_000,
            error_grace_ms: 100,
            poll_interval_ms: 1,
            max_stream_buffer: 64 * 1024,
            framing: Framing::default(),
            baud_rate: 115_200,
        }
    }
}

impl TransportConfig {
    /// Parse and validate a JSON document.  Missing fields take defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing transport config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_timeout_ms == 0 {
            bail!("default_timeout_ms must be non-zero");
        }
        if self.connect_timeout_ms == 0 {
            bail!("connect_timeout_ms must be non-zero");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be non-zero");
        }
        if self.baud_rate == 0 {
            bail!("baud_rate must be non-zero");
        }
        if self.max_stream_buffer < MAX_MARKER_LEN {
            bail!("max_stream_buffer must hold at least one marker");
        }
        Ok(())
    }

    /// Same configuration with different byte-stream delimiters.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn error_grace(&self) -> Duration {
        Duration::from_millis(self.error_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
