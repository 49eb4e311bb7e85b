//! esprpc: host-side binary RPC client for small embedded peers.
//!
//! Issues typed remote calls over a WebSocket, BLE GATT write/notify
//! characteristics, or a raw serial byte stream, using a compact
//! schema-driven binary format.  Everything is single-threaded and
//! cooperative; see [`transport::RpcTransport`].

#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod rpc;
pub mod service;
pub mod transport;

pub use config::{Framing, TransportConfig};
pub use error::{CodecError, Error, LinkError, Result};
pub use rpc::codec::Codec;
pub use rpc::schema::{Field, FieldType, MethodKind, MethodSchema, Schema};
pub use rpc::value::Value;
pub use transport::{ConnectionState, Delivery, Link, LinkEvent, RpcTransport};
