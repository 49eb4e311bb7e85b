//! Transport-agnostic RPC protocol core.
//!
//! Compact binary RPC: a per-method positional codec inside a fixed 5-byte
//! envelope, with request/response correlation and server push.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Stack                             │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐   │
//! │  │  Codec   │──▶│ Envelope │──▶│  Link (ws/ble/...)    │   │
//! │  │ (schema) │   │ (5B hdr) │   │  + stream framing     │   │
//! │  └──────────┘   └──────────┘   └───────────────────────┘   │
//! │       ▲                                    │               │
//! │       │              ┌─────────────────────┘               │
//! │       │              ▼                                     │
//! │  ┌─────────────┐   ┌───────────────┐                       │
//! │  │ Correlation │◀──│ Dispatch      │──▶ Subscriptions      │
//! │  │ (responses) │   │ (by corr. id) │    (push frames)      │
//! │  └─────────────┘   └───────────────┘                       │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod correlation;
pub mod envelope;
pub mod schema;
pub mod stream;
pub mod subscriptions;
pub mod value;
